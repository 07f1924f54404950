//! Filtered-stream API client.
//!
//! Provides rule synchronization, stream reading and reply posting.

mod oauth;
mod reply;
mod rules;
mod stream;
mod types;

pub use oauth::OAuthSigner;
pub use reply::{reply_text, ReplyAction, TwitterReplier};
pub use rules::{HttpRuleApi, RuleApi, RuleSynchronizer, SyncReport};
pub use stream::{Backoff, ReaderStats, StreamReader};
pub use types::{parse_stream_line, ParseError, RemoteRule, RulesResponse, StreamEvent};

#[cfg(test)]
pub(crate) use rules::tests::InMemoryRules;
