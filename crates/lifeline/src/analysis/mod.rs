//! Post analysis.
//!
//! The processor only needs a negative/non-negative verdict; the lexicon
//! classifier is the built-in implementation.

mod sentiment;

pub use sentiment::{LexiconClassifier, Sentiment, SentimentClassifier};
