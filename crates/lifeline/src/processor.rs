//! Event processor - classifies dispatched posts and replies to negative ones.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::SentimentClassifier;
use crate::queue::{DispatchJob, JobReceiver};
use crate::twitter::ReplyAction;

/// What happened to a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Classified negative and answered.
    Replied,
    /// Classified non-negative; nothing posted.
    Ignored,
    /// Classification or reply failed; the job was dropped.
    Failed,
}

/// Totals over the processor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub processed: u64,
    pub replied: u64,
    pub ignored: u64,
    pub failed: u64,
    /// Jobs still queued at shutdown.
    pub discarded: u64,
}

impl ProcessorStats {
    fn record(&mut self, outcome: JobOutcome) {
        self.processed += 1;
        match outcome {
            JobOutcome::Replied => self.replied += 1,
            JobOutcome::Ignored => self.ignored += 1,
            JobOutcome::Failed => self.failed += 1,
        }
    }
}

/// Drains the dispatch queue one job at a time.
pub struct EventProcessor {
    classifier: Arc<dyn SentimentClassifier>,
    replier: Arc<dyn ReplyAction>,
    support_message: String,
}

impl EventProcessor {
    #[must_use]
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        replier: Arc<dyn ReplyAction>,
        support_message: String,
    ) -> Self {
        Self {
            classifier,
            replier,
            support_message,
        }
    }

    /// Handle one job. Failures are logged and never propagated.
    pub async fn process_job(&self, job: DispatchJob) -> JobOutcome {
        let event = job.event;

        let sentiment = match self.classifier.classify(&event.text).await {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    id = %event.id,
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classification failed, dropping post"
                );
                return JobOutcome::Failed;
            }
        };

        if !sentiment.is_negative() {
            debug!(id = %event.id, "Post is not negative");
            return JobOutcome::Ignored;
        }

        match self
            .replier
            .reply(&event.author_username, &event.id, &self.support_message)
            .await
        {
            Ok(()) => {
                info!(id = %event.id, author = %event.author_username, "Replied to post");
                JobOutcome::Replied
            }
            Err(e) => {
                tracing::error!(
                    id = %event.id,
                    author = %event.author_username,
                    error = %e,
                    "Failed to post reply"
                );
                JobOutcome::Failed
            }
        }
    }

    /// Process jobs in arrival order until the queue closes or `cancel` fires.
    ///
    /// On cancellation, jobs still waiting in the queue are discarded.
    pub async fn run(
        &self,
        mut receiver: JobReceiver,
        cancel: CancellationToken,
    ) -> ProcessorStats {
        let mut stats = ProcessorStats::default();

        loop {
            let job = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    stats.discarded = receiver.discard_pending() as u64;
                    if stats.discarded > 0 {
                        warn!(discarded = stats.discarded, "Discarded queued posts on shutdown");
                    }
                    break;
                }
                job = receiver.next() => job,
            };

            let Some(job) = job else {
                debug!("Dispatch queue closed");
                break;
            };

            let outcome = self.process_job(job).await;
            stats.record(outcome);
        }

        info!(
            processed = stats.processed,
            replied = stats.replied,
            ignored = stats.ignored,
            failed = stats.failed,
            "Event processor stopped"
        );
        stats
    }
}
