//! HTTP client for the dashboard API.
//!
//! Endpoint:
//! - GET /api/dashboard?wallet_id=ID

use std::time::Duration;

use reqwest::Url;
use serde_json::Value;

use loopkit_types::{LoopError, Result};

pub struct DashboardClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl DashboardClient {
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn dashboard_url(&self, wallet_id: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}/api/dashboard", self.base_url),
            &[("wallet_id", wallet_id)],
        )
        .map_err(|e| LoopError::Config(format!("invalid dashboard url: {}", e)))
    }

    /// Fetch dashboard data for `wallet_id`.
    ///
    /// Without a wallet id nothing is requested and `Ok(None)` is returned.
    pub async fn fetch(&self, wallet_id: Option<&str>) -> Result<Option<Value>> {
        let Some(wallet_id) = wallet_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        self.get(wallet_id).await.map(Some).map_err(|e| {
            log::error!("Error during getting the data from API: {}", e);
            e
        })
    }

    async fn get(&self, wallet_id: &str) -> Result<Value> {
        let url = self.dashboard_url(wallet_id)?;

        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LoopError::Http(format!("dashboard request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(LoopError::Http(format!(
                "dashboard API returned status {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| LoopError::Http(format!("failed to parse dashboard response: {}", e)))
    }
}
