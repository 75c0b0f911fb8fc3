//! Local session state for loopkit.
//!
//! The only persisted value is the `wallet_id` of the connected wallet.
//! Provides a `MemoryStore` for testing and a JSON-backed `FileStore`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use loopkit_types::Result;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key under which the wallet identifier is recorded.
pub const WALLET_ID_KEY: &str = "wallet_id";

/// Everything a store persists.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SessionState {
    #[serde(rename = "wallet_id", default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
}

/// The session store trait.
///
/// `clear_wallet_id` must be idempotent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn init(&self) -> Result<()> { Ok(()) }

    async fn get_wallet_id(&self) -> Result<Option<String>>;
    async fn set_wallet_id(&self, wallet_id: &str) -> Result<()>;
    async fn clear_wallet_id(&self) -> Result<()>;
}
