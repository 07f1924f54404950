//! Filtered-stream reader.
//!
//! Holds one long-lived chunked GET open, splits the body into lines and
//! pushes every parsed post into the dispatch queue. Dropped connections are
//! reopened under the rules already installed; 429s are waited out.

use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{BotError, Result};
use crate::queue::{DispatchJob, JobSender};

use super::types::parse_stream_line;

/// Exponential backoff with a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    failures: u32,
    base: Duration,
    multiplier: f32,
    max: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, multiplier: f32, max: Duration) -> Self {
        Self {
            failures: 0,
            base,
            multiplier,
            max,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = i32::try_from(self.failures - 1).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * f64::from(self.multiplier).powi(exponent);
        let capped = secs.min(self.max.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max)
    }

    /// Forget past failures.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Counters kept across reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Successful stream opens.
    pub connections: u64,
    /// Posts handed to the queue.
    pub events: u64,
    /// Blank keep-alive lines.
    pub heartbeats: u64,
    /// Lines that could not be turned into a post.
    pub malformed: u64,
    /// Opens answered with 429.
    pub rate_limited: u64,
    /// Connections dropped for an over-long line.
    pub oversized: u64,
}

/// Why a connection stopped being read.
#[derive(Debug)]
enum Disconnect {
    Cancelled,
    QueueClosed,
    Eof,
    Stalled,
    Oversized(usize),
    Transport(reqwest::Error),
}

/// Reads the filtered stream and feeds the dispatch queue.
pub struct StreamReader {
    client: Client,
    url: String,
    bearer_token: String,
    policy: StreamConfig,
}

impl StreamReader {
    #[must_use]
    pub fn new(client: Client, url: String, bearer_token: String, policy: StreamConfig) -> Self {
        Self {
            client,
            url,
            bearer_token,
            policy,
        }
    }

    /// Read until cancelled, the queue closes, or the provider refuses the
    /// stream with a non-retryable status.
    pub async fn run(&self, sender: JobSender, cancel: CancellationToken) -> Result<ReaderStats> {
        let mut stats = ReaderStats::default();
        let mut rate_limit = Backoff::new(
            self.policy.rate_limit_cooldown,
            self.policy.backoff_multiplier,
            self.policy.max_backoff,
        );
        let mut reconnect = Backoff::new(
            self.policy.reconnect_delay,
            self.policy.backoff_multiplier,
            self.policy.max_backoff,
        );

        loop {
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(stats),
                opened = tokio::time::timeout(self.policy.stall_timeout, self.open()) => opened,
            };

            let delay = match opened {
                Err(_) => {
                    let delay = reconnect.next_delay();
                    warn!(
                        timeout_secs = self.policy.stall_timeout.as_secs(),
                        wait_secs = delay.as_secs(),
                        "Stream open timed out"
                    );
                    delay
                }
                Ok(Ok(response)) => {
                    rate_limit.reset();
                    reconnect.reset();
                    stats.connections += 1;
                    info!(connection = stats.connections, "Connected to filtered stream");

                    match self.consume(response, &sender, &cancel, &mut stats).await {
                        Disconnect::Cancelled => return Ok(stats),
                        Disconnect::QueueClosed => {
                            info!("Dispatch queue closed, stopping stream reader");
                            return Ok(stats);
                        }
                        Disconnect::Eof => info!(?stats, "Stream ended, reconnecting"),
                        Disconnect::Stalled => warn!(
                            timeout_secs = self.policy.stall_timeout.as_secs(),
                            ?stats,
                            "Stream went silent, reconnecting"
                        ),
                        Disconnect::Oversized(len) => {
                            stats.oversized += 1;
                            warn!(
                                buffered = len,
                                limit = self.policy.max_line_bytes,
                                "Stream line too long, reconnecting"
                            );
                        }
                        Disconnect::Transport(e) => {
                            warn!(error = %e, ?stats, "Stream read failed, reconnecting");
                        }
                    }
                    reconnect.next_delay()
                }
                Ok(Err(BotError::RateLimited)) => {
                    stats.rate_limited += 1;
                    let delay = rate_limit.next_delay();
                    warn!(
                        wait_secs = delay.as_secs(),
                        attempt = rate_limit.failures(),
                        "Too many requests. Waiting..."
                    );
                    delay
                }
                Ok(Err(e)) if e.is_fatal() => {
                    error!(error = %e, "Cannot open filtered stream");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    let delay = reconnect.next_delay();
                    warn!(error = %e, wait_secs = delay.as_secs(), "Stream connection failed");
                    delay
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(stats),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn open(&self) -> Result<Response> {
        debug!(url = %self.url, "Opening filtered stream");
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => Err(BotError::RateLimited),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BotError::StreamStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn consume(
        &self,
        response: Response,
        sender: &JobSender,
        cancel: &CancellationToken,
        stats: &mut ReaderStats,
    ) -> Disconnect {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        // Bytes of `buffer` already known to hold no newline.
        let mut scanned = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Disconnect::Cancelled,
                next = tokio::time::timeout(self.policy.stall_timeout, body.next()) => next,
            };

            let chunk = match next {
                Err(_) => return Disconnect::Stalled,
                Ok(None) => break,
                Ok(Some(Err(e))) => return Disconnect::Transport(e),
                Ok(Some(Ok(chunk))) => chunk,
            };

            buffer.extend_from_slice(&chunk);
            while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=scanned + offset).collect();
                scanned = 0;
                if let Some(stop) = Self::handle_line(&line, sender, cancel, stats).await {
                    return stop;
                }
            }
            scanned = buffer.len();

            if buffer.len() > self.policy.max_line_bytes {
                return Disconnect::Oversized(buffer.len());
            }
        }

        // A final line may arrive without its newline.
        if !buffer.is_empty() {
            if let Some(stop) = Self::handle_line(&buffer, sender, cancel, stats).await {
                return stop;
            }
        }
        Disconnect::Eof
    }

    async fn handle_line(
        line: &[u8],
        sender: &JobSender,
        cancel: &CancellationToken,
        stats: &mut ReaderStats,
    ) -> Option<Disconnect> {
        let line = String::from_utf8_lossy(line);
        let event = match parse_stream_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => {
                stats.heartbeats += 1;
                return None;
            }
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "Skipping stream line");
                return None;
            }
        };

        debug!(id = %event.id, author = %event.author_username, "Matched post");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Some(Disconnect::Cancelled),
            sent = sender.dispatch(DispatchJob::new(event)) => match sent {
                Ok(()) => {
                    stats.events += 1;
                    None
                }
                Err(_) => Some(Disconnect::QueueClosed),
            },
        }
    }
}
