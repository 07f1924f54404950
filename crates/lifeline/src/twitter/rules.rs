//! Filtered-stream rule synchronization.
//!
//! The remote rule set is replaced wholesale: fetch what is installed, delete
//! all of it in one call, then add the desired rules in one call.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::config::Rule;
use crate::error::{BotError, Result, RuleStage};

use super::types::{AddRulesRequest, DeleteIds, DeleteRulesRequest, RemoteRule, RulesResponse};

/// Rule-management operations offered by the provider.
#[async_trait]
pub trait RuleApi: Send + Sync {
    /// Fetch the currently installed rules.
    async fn fetch_rules(&self) -> Result<Vec<RemoteRule>>;

    /// Delete rules by provider-assigned id, in one call.
    async fn delete_rules(&self, ids: &[String]) -> Result<()>;

    /// Install rules, in one call.
    async fn add_rules(&self, rules: &[Rule]) -> Result<()>;
}

/// Rule API backed by the provider's HTTP endpoint.
pub struct HttpRuleApi {
    client: Client,
    url: String,
    bearer_token: String,
}

impl HttpRuleApi {
    /// Create a client for the given rules endpoint.
    #[must_use]
    pub fn new(client: Client, url: String, bearer_token: String) -> Self {
        Self {
            client,
            url,
            bearer_token,
        }
    }

    async fn expect_status(
        response: reqwest::Response,
        stage: RuleStage,
        expected: StatusCode,
    ) -> Result<String> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status != expected {
            tracing::error!(
                %stage,
                status = status.as_u16(),
                body = %body,
                "Rule management call failed"
            );
            return Err(BotError::RuleSync {
                stage,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl RuleApi for HttpRuleApi {
    async fn fetch_rules(&self) -> Result<Vec<RemoteRule>> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        let body = Self::expect_status(response, RuleStage::Fetch, StatusCode::OK).await?;
        debug!(body = %body, "Fetched rules");

        let parsed: RulesResponse = serde_json::from_str(&body)?;
        Ok(parsed.data.unwrap_or_default())
    }

    async fn delete_rules(&self, ids: &[String]) -> Result<()> {
        let payload = DeleteRulesRequest {
            delete: DeleteIds {
                ids: ids.iter().map(String::as_str).collect(),
            },
        };
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.bearer_token)
            .json(&payload)
            .send()
            .await?;
        let body = Self::expect_status(response, RuleStage::Delete, StatusCode::OK).await?;
        debug!(body = %body, "Deleted rules");
        Ok(())
    }

    async fn add_rules(&self, rules: &[Rule]) -> Result<()> {
        let payload = AddRulesRequest { add: rules };
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.bearer_token)
            .json(&payload)
            .send()
            .await?;
        let body = Self::expect_status(response, RuleStage::Add, StatusCode::CREATED).await?;
        debug!(body = %body, "Added rules");
        Ok(())
    }
}

/// Outcome of a synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Rules removed from the provider.
    pub deleted: usize,
    /// Rules installed.
    pub added: usize,
}

/// Makes the remote rule set equal to the desired one.
pub struct RuleSynchronizer<'a> {
    api: &'a dyn RuleApi,
}

impl<'a> RuleSynchronizer<'a> {
    #[must_use]
    pub fn new(api: &'a dyn RuleApi) -> Self {
        Self { api }
    }

    /// Replace every installed rule with `desired`.
    ///
    /// Any non-success status is fatal and is returned without retrying.
    pub async fn synchronize(&self, desired: &[Rule]) -> Result<SyncReport> {
        let current = self.api.fetch_rules().await?;
        let mut report = SyncReport::default();

        if current.is_empty() {
            debug!("No rules installed");
        } else {
            let ids: Vec<String> = current.iter().map(|r| r.id.clone()).collect();
            self.api.delete_rules(&ids).await?;
            report.deleted = ids.len();
        }

        self.api.add_rules(desired).await?;
        report.added = desired.len();

        info!(
            deleted = report.deleted,
            added = report.added,
            "Stream rules synchronized"
        );
        Ok(report)
    }

    /// The rules currently installed, without changing anything.
    pub async fn list(&self) -> Result<Vec<RemoteRule>> {
        self.api.fetch_rules().await
    }
}
