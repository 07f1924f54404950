//! Filtered-stream wire types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Rule;

/// A rule as stored by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRule {
    /// Provider-assigned id, the only handle usable for deletion.
    pub id: String,
    pub value: String,
    #[serde(default)]
    pub tag: String,
}

impl RemoteRule {
    /// The `value`/`tag` pair this rule was created from.
    #[must_use]
    pub fn to_rule(&self) -> Rule {
        Rule::new(self.value.clone(), self.tag.clone())
    }
}

/// Body of `GET /rules`. `data` is absent when no rules are installed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesResponse {
    #[serde(default)]
    pub data: Option<Vec<RemoteRule>>,
}

impl RulesResponse {
    /// Installed rules, empty when none.
    #[must_use]
    pub fn rules(&self) -> &[RemoteRule] {
        self.data.as_deref().unwrap_or_default()
    }
}

/// Body of `POST /rules` for deletion.
#[derive(Debug, Serialize)]
pub(crate) struct DeleteRulesRequest<'a> {
    pub delete: DeleteIds<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteIds<'a> {
    pub ids: Vec<&'a str>,
}

/// Body of `POST /rules` for creation.
#[derive(Debug, Serialize)]
pub(crate) struct AddRulesRequest<'a> {
    pub add: &'a [Rule],
}

/// A post delivered by the filtered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub text: String,
    pub id: String,
    pub author_username: String,
}

/// Why a stream line could not become a [`StreamEvent`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The line is not JSON of the expected shape
    #[error("malformed stream line: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The provider sent an error object instead of a post
    #[error("stream reported errors: {0}")]
    Provider(String),

    /// The post carried no author expansion
    #[error("post {0} has no author expansion")]
    MissingAuthor(String),
}

#[derive(Debug, Deserialize)]
struct RawStreamLine {
    data: Option<RawPost>,
    #[serde(default)]
    includes: Option<RawIncludes>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawIncludes {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    username: String,
}

/// Parse one line of the stream body.
///
/// Blank lines are keep-alive heartbeats and yield `Ok(None)`. The author is
/// taken from the first user expansion entry.
pub fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let raw: RawStreamLine = serde_json::from_str(line)?;
    let Some(post) = raw.data else {
        let detail = raw
            .errors
            .map_or_else(|| "no data".to_string(), |e| e.to_string());
        return Err(ParseError::Provider(detail));
    };

    let author = raw
        .includes
        .and_then(|inc| inc.users.into_iter().next())
        .map(|u| u.username)
        .ok_or_else(|| ParseError::MissingAuthor(post.id.clone()))?;

    Ok(Some(StreamEvent {
        text: post.text,
        id: post.id,
        author_username: author,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_line() {
        let line = r#"{"data":{"id":"1445880548472328192","text":"i want to die"},"includes":{"users":[{"id":"9","name":"Alice","username":"alice"},{"id":"10","username":"bob"}]},"matching_rules":[{"id":"1","tag":"iwtd"}]}"#;
        let event = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(
            event,
            StreamEvent {
                text: "i want to die".to_string(),
                id: "1445880548472328192".to_string(),
                author_username: "alice".to_string(),
            }
        );
    }

    #[test]
    fn test_blank_lines_are_heartbeats() {
        for line in ["", "\r", "\r\n", "   "] {
            assert!(parse_stream_line(line).unwrap().is_none(), "{line:?}");
        }
    }

    #[test]
    fn test_provider_error_object() {
        let line = r#"{"errors":[{"title":"operational-disconnect","disconnect_type":"UpstreamOperationalDisconnect"}]}"#;
        let err = parse_stream_line(line).unwrap_err();
        assert!(matches!(err, ParseError::Provider(ref d) if d.contains("operational-disconnect")));
    }

    #[test]
    fn test_missing_author() {
        let line = r#"{"data":{"id":"5","text":"hello"}}"#;
        assert!(matches!(
            parse_stream_line(line),
            Err(ParseError::MissingAuthor(id)) if id == "5"
        ));
    }

    #[test]
    fn test_garbage_line() {
        assert!(matches!(
            parse_stream_line("{not json"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_rules_response_without_data() {
        let resp: RulesResponse =
            serde_json::from_str(r#"{"meta":{"sent":"2024-01-01T00:00:00Z","result_count":0}}"#)
                .unwrap();
        assert!(resp.rules().is_empty());

        let empty: RulesResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.rules().is_empty());
    }
}
