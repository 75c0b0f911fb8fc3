//! Session store persisted as a small JSON document on disk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::*;
use loopkit_types::{LoopError, Result};

pub struct FileStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<SessionState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(SessionState::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                LoopError::Storage(format!("corrupt session file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionState::default()),
            Err(e) => Err(LoopError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| LoopError::Storage(format!("failed to encode session: {}", e)))?;
        tokio::fs::write(&self.path, body).await.map_err(|e| {
            LoopError::Storage(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LoopError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        Ok(())
    }

    async fn get_wallet_id(&self) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.wallet_id)
    }

    async fn set_wallet_id(&self, wallet_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        state.wallet_id = Some(wallet_id.to_string());
        self.save(&state).await
    }

    async fn clear_wallet_id(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        if state.wallet_id.take().is_none() {
            return Ok(());
        }
        log::debug!("clearing {} from {}", WALLET_ID_KEY, self.path.display());
        self.save(&state).await
    }
}
