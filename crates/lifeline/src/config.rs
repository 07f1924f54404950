//! Configuration for the bot.
//!
//! Everything except secrets comes from an optional TOML file; every field has
//! a default, so an absent file yields the stock keyword rules and message.
//! Secrets are only ever read from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BotError, Result};

/// Default API root for the rule and stream endpoints.
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/2";

/// Default API root for the reply endpoint.
pub const DEFAULT_REPLY_API_BASE: &str = "https://api.twitter.com/1.1";

/// Default message posted under negative matches.
pub const DEFAULT_SUPPORT_MESSAGE: &str = "If you are suicidal or depressed, please call 800-273-8255 or text \"HOME\" to 741741. If you are outside the US, please check https://www.befrienders.org/ to find a hotline number in your country. \u{2665}";

/// Default dispatch queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default bound on a whole reply or credential-check request.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest wait any stream backoff may be configured to.
pub const MAX_BACKOFF_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

/// Environment variable holding the stream/rules bearer token.
pub const ENV_BEARER: &str = "BEARER";
/// Environment variable holding the OAuth consumer key.
pub const ENV_API_KEY: &str = "API_KEY";
/// Environment variable holding the OAuth consumer secret.
pub const ENV_API_SECRET: &str = "API_SECRET";
/// Environment variable holding the OAuth access token.
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
/// Environment variable holding the OAuth access token secret.
pub const ENV_ACCESS_TOKEN_SECRET: &str = "ACCESS_TOKEN_SECRET";

/// A filtered-stream match rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Query expression.
    pub value: String,
    /// Label echoed back with matches.
    pub tag: String,
}

impl Rule {
    /// Create a new rule.
    #[must_use]
    pub fn new(value: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            tag: tag.into(),
        }
    }
}

/// The stock keyword rules.
#[must_use]
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("\"kill myself\" -is:retweet -is:quote", "killmyself"),
        Rule::new("\"killing myself\" -is:retweet -is:quote", "killingmyself"),
        Rule::new("\"i want to die\" -is:retweet -is:quote", "iwtd"),
    ]
}

/// Bot configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Desired filtered-stream rules, installed in order.
    pub rules: Vec<Rule>,
    /// Text appended after the `@author` mention in every reply.
    pub support_message: String,
    /// Root of the rule and stream endpoints.
    pub api_base: String,
    /// Root of the reply endpoint.
    pub reply_api_base: String,
    /// Capacity of the queue between the stream reader and the processor.
    pub queue_capacity: usize,
    /// Stream connection policy.
    pub stream: StreamConfig,
    /// Polarity below which a post counts as negative.
    pub negative_threshold: f32,
    /// Check the reply credentials before touching the stream.
    pub verify_credentials: bool,
    /// Give up on a reply (or the credential check) after this long.
    #[serde(with = "duration_secs")]
    pub reply_timeout: Duration,
    /// Where warnings and errors are recorded.
    pub log_file: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            support_message: DEFAULT_SUPPORT_MESSAGE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            reply_api_base: DEFAULT_REPLY_API_BASE.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stream: StreamConfig::default(),
            negative_threshold: 0.0,
            verify_credentials: true,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            log_file: PathBuf::from("app.log"),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    BotError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BotError::Config(e.to_string()))
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(BotError::Config("at least one rule is required".into()));
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.value.trim().is_empty() || r.tag.trim().is_empty())
        {
            return Err(BotError::Config(format!(
                "rule has an empty value or tag: {rule:?}"
            )));
        }
        if self.support_message.trim().is_empty() {
            return Err(BotError::Config("support_message must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(BotError::Config("queue_capacity must be positive".into()));
        }
        if self.reply_timeout.is_zero() {
            return Err(BotError::Config("reply_timeout must be positive".into()));
        }
        self.stream.validate()
    }

    /// Full URL of the rule-management endpoint.
    #[must_use]
    pub fn rules_url(&self) -> String {
        format!("{}/tweets/search/stream/rules", trim_base(&self.api_base))
    }

    /// Full URL of the filtered stream, with author expansion.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!(
            "{}/tweets/search/stream?expansions=author_id",
            trim_base(&self.api_base)
        )
    }
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// Stream connection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// First wait after a 429.
    #[serde(with = "duration_secs")]
    pub rate_limit_cooldown: Duration,
    /// Growth factor for consecutive 429s.
    pub backoff_multiplier: f32,
    /// Upper bound on the 429 wait.
    #[serde(with = "duration_secs")]
    pub max_backoff: Duration,
    /// Wait before reopening a dropped connection.
    #[serde(with = "duration_secs")]
    pub reconnect_delay: Duration,
    /// Silence (heartbeats included) after which the connection is presumed
    /// dead. Also bounds how long opening the stream may take.
    #[serde(with = "duration_secs")]
    pub stall_timeout: Duration,
    /// Longest line accepted before the connection is dropped.
    pub max_line_bytes: usize,
}

impl StreamConfig {
    fn validate(&self) -> Result<()> {
        let positive = [
            ("stream.rate_limit_cooldown", self.rate_limit_cooldown),
            ("stream.max_backoff", self.max_backoff),
            ("stream.reconnect_delay", self.reconnect_delay),
            ("stream.stall_timeout", self.stall_timeout),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, d)| d.is_zero()) {
            return Err(BotError::Config(format!("{name} must be positive")));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(BotError::Config(
                "stream.backoff_multiplier must be a finite number of at least 1.0".into(),
            ));
        }
        if self.max_backoff > MAX_BACKOFF_CEILING {
            return Err(BotError::Config(format!(
                "stream.max_backoff must not exceed {} seconds",
                MAX_BACKOFF_CEILING.as_secs()
            )));
        }
        if self.max_line_bytes == 0 {
            return Err(BotError::Config(
                "stream.max_line_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rate_limit_cooldown: Duration::from_secs(15 * 60), // 15 minutes
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60 * 60), // 1 hour
            reconnect_delay: Duration::from_secs(5),
            stall_timeout: Duration::from_secs(90),
            max_line_bytes: 1024 * 1024,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Credentials for the provider, read from the environment.
#[derive(Clone)]
pub struct Credentials {
    /// Bearer token for the rule and stream endpoints.
    pub bearer_token: String,
    /// OAuth 1.0a credentials for posting replies.
    pub oauth: OAuthCredentials,
}

/// The four-part OAuth 1.0a credential set.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl Credentials {
    /// Load all credentials from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load credentials through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(BotError::MissingCredential(name))
        };

        Ok(Self {
            bearer_token: require(ENV_BEARER)?,
            oauth: OAuthCredentials {
                consumer_key: require(ENV_API_KEY)?,
                consumer_secret: require(ENV_API_SECRET)?,
                access_token: require(ENV_ACCESS_TOKEN)?,
                access_token_secret: require(ENV_ACCESS_TOKEN_SECRET)?,
            },
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"<redacted>")
            .field("oauth", &self.oauth)
            .finish()
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}
