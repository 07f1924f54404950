//! Sentiment classification.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Binary verdict used to decide whether to reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Negative,
    NonNegative,
}

impl Sentiment {
    #[must_use]
    pub fn is_negative(self) -> bool {
        matches!(self, Self::Negative)
    }
}

/// Anything that can label a post's text.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Classify a post's text.
    async fn classify(&self, text: &str) -> Result<Sentiment>;
}

/// Weighted-lexicon polarity scorer.
///
/// Each known word contributes its weight; a negator within the two preceding
/// tokens flips the sign and an intensifier immediately before scales it. The
/// sum is divided by the number of scored words, giving a polarity in
/// `[-1.0, 1.0]`. Text with no scored words has polarity `0.0`.
pub struct LexiconClassifier {
    lexicon: HashMap<&'static str, f32>,
    threshold: f32,
}

const NEGATIVE_WORDS: &[(&str, f32)] = &[
    ("kill", -0.8),
    ("killing", -0.8),
    ("die", -0.8),
    ("dying", -0.7),
    ("dead", -0.6),
    ("death", -0.6),
    ("suicide", -1.0),
    ("suicidal", -1.0),
    ("hate", -0.8),
    ("hurt", -0.6),
    ("pain", -0.6),
    ("sad", -0.6),
    ("depressed", -0.9),
    ("depression", -0.8),
    ("hopeless", -0.9),
    ("worthless", -0.9),
    ("alone", -0.5),
    ("lonely", -0.6),
    ("tired", -0.4),
    ("exhausted", -0.5),
    ("cry", -0.5),
    ("crying", -0.5),
    ("miserable", -0.8),
    ("empty", -0.5),
    ("numb", -0.5),
    ("broken", -0.6),
    ("awful", -0.7),
    ("terrible", -0.7),
    ("worst", -0.7),
    ("burden", -0.7),
    ("can't", -0.2),
    ("anymore", -0.3),
    ("never", -0.2),
];

const POSITIVE_WORDS: &[(&str, f32)] = &[
    ("love", 0.6),
    ("happy", 0.8),
    ("nice", 0.6),
    ("great", 0.8),
    ("good", 0.6),
    ("fun", 0.6),
    ("funny", 0.7),
    ("hilarious", 0.9),
    ("lol", 0.8),
    ("lmao", 0.9),
    ("lmfao", 0.9),
    ("haha", 0.8),
    ("hahaha", 0.9),
    ("joke", 0.6),
    ("joking", 0.6),
    ("best", 0.8),
    ("amazing", 0.9),
    ("excited", 0.8),
    ("awesome", 0.9),
    ("beautiful", 0.8),
    ("cute", 0.7),
    ("thanks", 0.5),
    ("glad", 0.6),
];

const NEGATORS: &[&str] = &["not", "no", "never", "don't", "dont", "isn't", "wasn't", "ain't"];

const INTENSIFIERS: &[(&str, f32)] = &[
    ("so", 1.3),
    ("very", 1.3),
    ("really", 1.3),
    ("literally", 1.2),
    ("extremely", 1.5),
    ("totally", 1.2),
];

impl LexiconClassifier {
    /// Create a classifier that calls anything below `threshold` negative.
    #[must_use]
    pub fn new(threshold: f32) -> Self {
        let lexicon = NEGATIVE_WORDS
            .iter()
            .chain(POSITIVE_WORDS)
            .copied()
            .collect();
        Self { lexicon, threshold }
    }

    /// Polarity of `text` in `[-1.0, 1.0]`.
    #[must_use]
    pub fn polarity(&self, text: &str) -> f32 {
        let tokens = tokenize(text);
        let mut total = 0.0_f32;
        let mut scored = 0_u32;

        for (i, token) in tokens.iter().enumerate() {
            let Some(weight) = self.lexicon.get(token.as_str()) else {
                continue;
            };
            let negated = tokens[i.saturating_sub(2)..i]
                .iter()
                .any(|t| NEGATORS.contains(&t.as_str()));
            let boost = i
                .checked_sub(1)
                .and_then(|p| INTENSIFIERS.iter().find(|(w, _)| *w == tokens[p]))
                .map_or(1.0, |(_, factor)| *factor);

            let mut score = weight * boost;
            if negated {
                score = -score * 0.5;
            }
            total += score;
            scored += 1;
        }

        if scored == 0 {
            0.0
        } else {
            (total / scored as f32).clamp(-1.0, 1.0)
        }
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[async_trait]
impl SentimentClassifier for LexiconClassifier {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<Sentiment> {
        let polarity = self.polarity(text);
        tracing::trace!(polarity, threshold = self.threshold, "Scored post");
        if polarity < self.threshold {
            Ok(Sentiment::Negative)
        } else {
            Ok(Sentiment::NonNegative)
        }
    }
}

/// Lowercase word tokens, keeping apostrophes inside words.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '\u{2019}'))
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('\u{2019}', "'").to_lowercase())
        .filter(|t| !t.starts_with("http"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("I CAN’T do this anymore!!"),
            vec!["i", "can't", "do", "this", "anymore"]
        );
    }

    #[test]
    fn test_polarity_sign() {
        let classifier = LexiconClassifier::default();
        assert!(classifier.polarity("i want to kill myself") < 0.0);
        assert!(classifier.polarity("what a nice day") > 0.0);
        assert!(classifier.polarity("the bus is late").abs() < f32::EPSILON);
    }

    #[test]
    fn test_negation_flips() {
        let classifier = LexiconClassifier::default();
        assert!(classifier.polarity("i am happy") > 0.0);
        assert!(classifier.polarity("i am not happy") < 0.0);
    }

    #[test]
    fn test_joking_match_is_not_negative() {
        let classifier = LexiconClassifier::default();
        assert!(classifier.polarity("this exam is killing me lmao so funny") >= 0.0);
    }

    #[tokio::test]
    async fn test_classify_threshold() {
        let classifier = LexiconClassifier::default();
        assert_eq!(
            classifier.classify("i want to die").await.unwrap(),
            Sentiment::Negative
        );
        // Neutral text is not negative.
        assert_eq!(
            classifier.classify("going to the store").await.unwrap(),
            Sentiment::NonNegative
        );

        let strict = LexiconClassifier::new(-0.9);
        assert_eq!(
            strict.classify("i am tired").await.unwrap(),
            Sentiment::NonNegative
        );
    }
}
