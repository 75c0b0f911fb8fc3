//! In-memory session store for testing and ephemeral use.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::*;
use loopkit_types::{LoopError, Result};

pub struct MemoryStore {
    state: Mutex<SessionState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|_| LoopError::Storage("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_wallet_id(&self) -> Result<Option<String>> {
        Ok(self.state()?.wallet_id.clone())
    }

    async fn set_wallet_id(&self, wallet_id: &str) -> Result<()> {
        self.state()?.wallet_id = Some(wallet_id.to_string());
        Ok(())
    }

    async fn clear_wallet_id(&self) -> Result<()> {
        self.state()?.wallet_id = None;
        Ok(())
    }
}
