//! Bounded hand-off between the stream reader and the event processor.
//!
//! Enqueue waits while the queue is full, so a slow processor throttles the
//! reader instead of growing memory or dropping posts.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::{BotError, Result};
use crate::twitter::StreamEvent;

/// A matched post in transit to the processor.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub event: StreamEvent,
    /// When the reader handed the job over.
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchJob {
    #[must_use]
    pub fn new(event: StreamEvent) -> Self {
        Self {
            event,
            enqueued_at: Utc::now(),
        }
    }
}

/// The consumer side went away; the job is handed back.
#[derive(Debug)]
pub struct QueueClosed(pub DispatchJob);

/// Create a queue holding at most `capacity` jobs.
pub fn dispatch_queue(capacity: usize) -> Result<(JobSender, JobReceiver)> {
    if capacity == 0 {
        return Err(BotError::Config("queue capacity must be positive".into()));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((JobSender { tx }, JobReceiver { rx }))
}

/// Producer handle, owned by the stream reader.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<DispatchJob>,
}

impl JobSender {
    /// Enqueue a job, waiting for room if the queue is full.
    pub async fn dispatch(&self, job: DispatchJob) -> std::result::Result<(), QueueClosed> {
        self.tx.send(job).await.map_err(|e| QueueClosed(e.0))
    }

    /// Whether the receiver has been dropped or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer handle, owned by the event processor.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<DispatchJob>,
}

impl JobReceiver {
    /// Next job in FIFO order; `None` once every sender is gone and the queue is empty.
    pub async fn next(&mut self) -> Option<DispatchJob> {
        self.rx.recv().await
    }

    /// Stop accepting jobs and drop whatever is still queued.
    ///
    /// Returns how many jobs were discarded.
    pub fn discard_pending(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
