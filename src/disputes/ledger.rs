//! Dispute ledger collaborator.
//!
//! The ledger is bookkeeping only. Chain operations never depend on it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::json;

use crate::config::DisputeConfig;
use crate::disputes::types::{Decision, DisputeEntry, NewDispute};
use crate::error::{EscrowError, EscrowResult};

#[async_trait]
pub trait DisputeLedger: Send + Sync {
    async fn open(&self, dispute: &NewDispute) -> EscrowResult<DisputeEntry>;

    /// Rows filed by, or naming, `identity`.
    async fn list(&self, identity: &str) -> EscrowResult<Vec<DisputeEntry>>;

    /// Ask the platform to review the dispute on `record_id`.
    async fn request_review(&self, record_id: u64) -> EscrowResult<()>;

    async fn mark_resolved(&self, record_id: u64, decision: Decision) -> EscrowResult<()>;
}

/// JSON over HTTP ledger.
///
/// ```text
/// POST {base}/disputes                      open
/// GET  {base}/disputes?identity=…           list
/// POST {base}/disputes/{record_id}/review   request review
/// POST {base}/disputes/{record_id}/resolve  mark resolved
/// ```
#[derive(Debug, Clone)]
pub struct HttpDisputeLedger {
    client: Client,
    base_url: String,
}

impl HttpDisputeLedger {
    pub fn new(base_url: &str, timeout: Duration) -> EscrowResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EscrowError::Ledger(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `None` when no ledger endpoint is configured.
    pub fn from_config(config: &DisputeConfig) -> EscrowResult<Option<Self>> {
        match &config.base_url {
            Some(url) => Ok(Some(Self::new(url, Duration::from_secs(config.timeout_secs))?)),
            None => Ok(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> EscrowResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(EscrowError::Ledger(format!(
            "{} returned {}: {}",
            url,
            status,
            body.trim()
        )))
    }
}

fn transport(e: reqwest::Error) -> EscrowError {
    EscrowError::Ledger(e.to_string())
}

#[async_trait]
impl DisputeLedger for HttpDisputeLedger {
    async fn open(&self, dispute: &NewDispute) -> EscrowResult<DisputeEntry> {
        let response = self
            .client
            .post(self.url("/disputes"))
            .json(dispute)
            .send()
            .await
            .map_err(transport)?;
        let entry: DisputeEntry = Self::check(response).await?.json().await.map_err(transport)?;
        tracing::info!(dispute_id = entry.id, record_id = entry.record_id, "Dispute filed");
        Ok(entry)
    }

    async fn list(&self, identity: &str) -> EscrowResult<Vec<DisputeEntry>> {
        let response = self
            .client
            .get(self.url("/disputes"))
            .query(&[("identity", identity)])
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn request_review(&self, record_id: u64) -> EscrowResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/disputes/{}/review", record_id)))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn mark_resolved(&self, record_id: u64, decision: Decision) -> EscrowResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/disputes/{}/resolve", record_id)))
            .json(&json!({ "decision": decision }))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let ledger = HttpDisputeLedger::new("http://ledger.local/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(ledger.url("/disputes"), "http://ledger.local/api/disputes");
    }

    #[test]
    fn test_unconfigured_ledger() {
        let config = DisputeConfig {
            base_url: None,
            ..Default::default()
        };
        assert!(HttpDisputeLedger::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_ledger_error() {
        let ledger = HttpDisputeLedger::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let err = ledger.request_review(3).await.unwrap_err();
        assert!(matches!(err, EscrowError::Ledger(_)));
    }
}
