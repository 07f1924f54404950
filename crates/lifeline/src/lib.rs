//! Filtered-stream support bot.
//!
//! This crate provides:
//! - Rule synchronization for the provider's filtered stream
//! - A resilient stream reader (heartbeats, 429 backoff, reconnects)
//! - A bounded dispatch queue between reading and processing
//! - Sentiment classification and OAuth-signed supportive replies

pub mod analysis;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod twitter;

// Re-export main types
pub use config::{BotConfig, Credentials, Rule};
pub use error::{BotError, Result};
pub use pipeline::{Bot, RunSummary};
pub use queue::{dispatch_queue, DispatchJob};
pub use twitter::StreamEvent;
