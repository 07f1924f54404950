//! Posting supportive replies.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{OAuthCredentials, DEFAULT_REPLY_TIMEOUT};
use crate::error::{BotError, Result};

use super::oauth::OAuthSigner;

/// Something that can answer a post.
#[async_trait]
pub trait ReplyAction: Send + Sync {
    /// Reply to `in_reply_to`, addressed to `@author`.
    async fn reply(&self, author: &str, in_reply_to: &str, message: &str) -> Result<()>;
}

/// Text of a reply: the author mention followed by the message.
#[must_use]
pub fn reply_text(author: &str, message: &str) -> String {
    format!("@{author} {message}")
}

#[derive(Debug, Deserialize)]
struct VerifiedAccount {
    screen_name: String,
}

/// Posts replies through the v1.1 status endpoint with user-context OAuth.
pub struct TwitterReplier {
    client: Client,
    api_base: String,
    signer: OAuthSigner,
    timeout: Duration,
}

impl TwitterReplier {
    #[must_use]
    pub fn new(client: Client, api_base: &str, credentials: OAuthCredentials) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            signer: OAuthSigner::new(credentials),
            timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Bound every request, response body included, to `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Confirm the credentials are accepted, returning the account's handle.
    pub async fn verify_credentials(&self) -> Result<String> {
        let url = format!("{}/account/verify_credentials.json", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.signer.authorize("GET", &url, &[])?)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BotError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let account: VerifiedAccount = serde_json::from_str(&body)?;
        info!(account = %account.screen_name, "Reply credentials verified");
        Ok(account.screen_name)
    }
}

#[async_trait]
impl ReplyAction for TwitterReplier {
    async fn reply(&self, author: &str, in_reply_to: &str, message: &str) -> Result<()> {
        let url = format!("{}/statuses/update.json", self.api_base);
        let status = reply_text(author, message);
        let params = [
            ("status", status.as_str()),
            ("in_reply_to_status_id", in_reply_to),
        ];

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.signer.authorize("POST", &url, &params)?)
            .timeout(self.timeout)
            .form(&params[..])
            .send()
            .await?;

        let code = response.status();
        if !code.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Reply {
                status: code.as_u16(),
                body,
            });
        }

        debug!(author, in_reply_to, "Reply posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> OAuthCredentials {
        OAuthCredentials {
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            access_token: "token".to_string(),
            access_token_secret: "token-secret".to_string(),
        }
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(reply_text("alice", "You matter."), "@alice You matter.");
    }

    #[tokio::test]
    async fn test_reply_posts_signed_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1.1/statuses/update.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("in_reply_to_status_id=42"))
            .and(body_string_contains("status=%40alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let replier = TwitterReplier::new(
            Client::new(),
            &format!("{}/1.1/", server.uri()),
            credentials(),
        );
        replier.reply("alice", "42", "You matter.").await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("duplicate"))
            .mount(&server)
            .await;

        let replier = TwitterReplier::new(Client::new(), &server.uri(), credentials());
        let err = replier.reply("bob", "1", "hi").await.unwrap_err();
        assert!(matches!(err, BotError::Reply { status: 403, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_slow_reply_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let replier = TwitterReplier::new(Client::new(), &server.uri(), credentials())
            .with_timeout(Duration::from_millis(200));
        let err = tokio::time::timeout(Duration::from_secs(5), replier.reply("amy", "1", "hi"))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(&err, BotError::Http(e) if e.is_timeout()), "{err}");
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_slow_credential_check_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let replier = TwitterReplier::new(Client::new(), &server.uri(), credentials())
            .with_timeout(Duration::from_millis(200));
        let result =
            tokio::time::timeout(Duration::from_secs(5), replier.verify_credentials()).await;
        assert!(matches!(result, Ok(Err(BotError::Http(_)))));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/account/verify_credentials.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1, "screen_name": "lifeline_bot"})),
            )
            .mount(&server)
            .await;

        let replier = TwitterReplier::new(Client::new(), &server.uri(), credentials());
        assert_eq!(replier.verify_credentials().await.unwrap(), "lifeline_bot");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Could not authenticate you"))
            .mount(&server)
            .await;

        let replier = TwitterReplier::new(Client::new(), &server.uri(), credentials());
        let err = replier.verify_credentials().await.unwrap_err();
        assert!(matches!(err, BotError::Auth { status: 401, .. }));
        assert!(err.is_fatal());
    }
}
