//! Engine configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use loopkit_balances::TokenAddresses;
use loopkit_tx::{Backoff, PollPolicy};
use loopkit_types::{LoopError, Result};

/// Confirmation polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub exponential: bool,
    pub max_interval_ms: u64,
    /// 0 polls until the deadline or cancellation.
    pub max_attempts: u32,
    pub timeout_ms: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            exponential: false,
            max_interval_ms: 60_000,
            max_attempts: 120,
            timeout_ms: None,
        }
    }
}

impl PollConfig {
    pub fn to_policy(&self) -> Result<PollPolicy> {
        if self.interval_ms == 0 {
            return Err(LoopError::Config("poll.interval_ms must be positive".into()));
        }

        let backoff = if self.exponential {
            Backoff::Exponential {
                max_interval: Duration::from_millis(self.max_interval_ms.max(self.interval_ms)),
            }
        } else {
            Backoff::Fixed
        };

        Ok(PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            backoff,
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            timeout: self.timeout_ms.map(Duration::from_millis),
        })
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bridge_url: String,
    pub rpc_url: String,
    pub dashboard_url: String,
    pub request_timeout_ms: u64,
    pub poll: PollConfig,
    pub tokens: TokenAddresses,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:3000".into(),
            rpc_url: "http://127.0.0.1:5050/rpc".into(),
            dashboard_url: "http://127.0.0.1:8000".into(),
            request_timeout_ms: 30_000,
            poll: PollConfig::default(),
            tokens: TokenAddresses::mainnet(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| LoopError::Config(e.to_string()))?;
        config.poll.to_policy()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoopError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }
}
