//! Error types for the bot.

use thiserror::Error;

/// Errors that can occur while running the bot.
#[derive(Debug, Error)]
pub enum BotError {
    /// A required credential is not present in the environment
    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// Configuration is invalid or could not be loaded
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A rule-management call returned an unexpected status
    #[error("Cannot {stage} rules (HTTP {status}): {body}")]
    RuleSync {
        stage: RuleStage,
        status: u16,
        body: String,
    },

    /// The stream endpoint refused the connection with a non-retryable status
    #[error("Cannot get stream (HTTP {status}): {body}")]
    StreamStatus { status: u16, body: String },

    /// The stream endpoint answered 429
    #[error("Rate limited by the stream endpoint")]
    RateLimited,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sentiment classifier could not produce a verdict
    #[error("Classification failed: {0}")]
    Classifier(String),

    /// Posting a reply was rejected
    #[error("Cannot post reply (HTTP {status}): {body}")]
    Reply { status: u16, body: String },

    /// Reply credentials were rejected
    #[error("Reply credentials rejected (HTTP {status}): {body}")]
    Auth { status: u16, body: String },

    /// A pipeline worker panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl BotError {
    /// Whether this error must stop the process.
    ///
    /// Rate limits, transport failures and per-event failures are absorbed by
    /// the component that hit them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_)
                | Self::Config(_)
                | Self::RuleSync { .. }
                | Self::StreamStatus { .. }
                | Self::Auth { .. }
                | Self::Worker(_)
        )
    }
}

/// Which rule-management call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStage {
    Fetch,
    Delete,
    Add,
}

impl std::fmt::Display for RuleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Self::Fetch => "get",
            Self::Delete => "delete",
            Self::Add => "add",
        };
        f.write_str(verb)
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = BotError> = std::result::Result<T, E>;
