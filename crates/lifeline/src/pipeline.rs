//! Bot pipeline - synchronize rules once, then run reader and processor.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::analysis::LexiconClassifier;
use crate::config::{BotConfig, Credentials};
use crate::error::{BotError, Result};
use crate::processor::{EventProcessor, ProcessorStats};
use crate::queue::dispatch_queue;
use crate::twitter::{
    HttpRuleApi, ReaderStats, RemoteRule, RuleApi, RuleSynchronizer, StreamReader, SyncReport,
    TwitterReplier,
};

/// Connect timeout for every provider call. Reads on the stream are bounded
/// by the stall timeout instead.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub sync: SyncReport,
    pub reader: ReaderStats,
    pub processor: ProcessorStats,
}

/// The assembled bot.
pub struct Bot {
    config: BotConfig,
    rules: Arc<dyn RuleApi>,
    reader: StreamReader,
    processor: EventProcessor,
    verifier: Option<TwitterReplier>,
}

impl Bot {
    /// Build the bot against the provider's real endpoints.
    pub fn new(config: BotConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("lifeline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let rules = Arc::new(HttpRuleApi::new(
            client.clone(),
            config.rules_url(),
            credentials.bearer_token.clone(),
        ));
        let reader = StreamReader::new(
            client.clone(),
            config.stream_url(),
            credentials.bearer_token.clone(),
            config.stream.clone(),
        );
        let replier = Arc::new(
            TwitterReplier::new(
                client.clone(),
                &config.reply_api_base,
                credentials.oauth.clone(),
            )
            .with_timeout(config.reply_timeout),
        );
        let processor = EventProcessor::new(
            Arc::new(LexiconClassifier::new(config.negative_threshold)),
            replier,
            config.support_message.clone(),
        );
        let verifier = config.verify_credentials.then(|| {
            TwitterReplier::new(client, &config.reply_api_base, credentials.oauth.clone())
                .with_timeout(config.reply_timeout)
        });

        Ok(Self {
            config,
            rules,
            reader,
            processor,
            verifier,
        })
    }

    /// Build the bot from already-constructed components.
    #[must_use]
    pub fn from_parts(
        config: BotConfig,
        rules: Arc<dyn RuleApi>,
        reader: StreamReader,
        processor: EventProcessor,
    ) -> Self {
        Self {
            config,
            rules,
            reader,
            processor,
            verifier: None,
        }
    }

    /// Replace the remote rules with the configured ones.
    pub async fn sync_rules(&self) -> Result<SyncReport> {
        RuleSynchronizer::new(self.rules.as_ref())
            .synchronize(&self.config.rules)
            .await
    }

    /// Rules currently installed at the provider.
    pub async fn list_rules(&self) -> Result<Vec<RemoteRule>> {
        RuleSynchronizer::new(self.rules.as_ref()).list().await
    }

    /// Run until `cancel` fires or a fatal error occurs.
    ///
    /// Credentials are checked and rules synchronized exactly once, before
    /// the reader and processor start. Reconnects never repeat either step.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary> {
        if let Some(verifier) = &self.verifier {
            verifier.verify_credentials().await?;
        }
        let sync = self.sync_rules().await?;

        let (sender, receiver) = dispatch_queue(self.config.queue_capacity)?;
        let workers = cancel.child_token();

        let reader = self.reader;
        let reader_cancel = workers.clone();
        let mut reader_task =
            tokio::spawn(async move { reader.run(sender, reader_cancel).await });

        let processor = self.processor;
        let processor_cancel = workers.clone();
        let mut processor_task =
            tokio::spawn(async move { processor.run(receiver, processor_cancel).await });

        info!(
            capacity = self.config.queue_capacity,
            rules = self.config.rules.len(),
            "Pipeline started"
        );

        let (reader_result, processor_result) = tokio::select! {
            reader_result = &mut reader_task => {
                workers.cancel();
                (reader_result, (&mut processor_task).await)
            }
            processor_result = &mut processor_task => {
                workers.cancel();
                ((&mut reader_task).await, processor_result)
            }
        };

        let processor = processor_result.map_err(worker_failed)?;
        let reader = match reader_result.map_err(worker_failed)? {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Stream reader stopped");
                return Err(e);
            }
        };

        info!(
            connections = reader.connections,
            events = reader.events,
            replied = processor.replied,
            "Pipeline stopped"
        );
        Ok(RunSummary {
            sync,
            reader,
            processor,
        })
    }
}

fn worker_failed(e: JoinError) -> BotError {
    BotError::Worker(e.to_string())
}
