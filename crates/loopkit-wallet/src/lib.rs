//! Wallet provider abstraction and the explicit wallet session.
//!
//! - `WalletProvider`: the external signing wallet (enable, execute, receipts, reads)
//! - `WalletSession`: one logical connection, passed to every operation
//! - `HttpWalletProvider`: wallet bridge + Starknet JSON-RPC over HTTP
//! - `MemoryProvider`: scripted provider for tests and ephemeral use

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use loopkit_store::SessionStore;
use loopkit_types::{
    Address, Call, ConnectionError, Felt, LoopError, ProviderError, Receipt, Result,
    TransactionHash,
};

pub mod http_provider;
pub mod memory;
pub mod selector;

pub use http_provider::HttpWalletProvider;
pub use memory::{MemoryProvider, ProviderEvent};

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// When the wallet picker is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ModalMode {
    #[default]
    AlwaysAsk,
    CanAsk,
    NeverAsk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModalTheme {
    #[default]
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    pub modal_mode: ModalMode,
    pub modal_theme: ModalTheme,
}

/// What the provider reports after `enable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderState {
    pub is_connected: bool,
    pub selected_address: Option<String>,
}

/// The external signing wallet.
///
/// User rejection must be reported as `ProviderError::UserRejected`,
/// never as free text.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn enable(&self, options: &ConnectOptions) -> ProviderResult<ProviderState>;

    /// Sign and submit `calls` as one transaction.
    async fn execute(&self, calls: &[Call]) -> ProviderResult<TransactionHash>;

    /// Fails while the transaction is not yet known.
    async fn get_transaction_receipt(&self, hash: &str) -> ProviderResult<Receipt>;

    async fn call_contract(&self, call: &Call) -> ProviderResult<Vec<Felt>>;
}

/// A single logical connection to a wallet provider.
pub struct WalletSession {
    provider: Arc<dyn WalletProvider>,
    store: Option<Arc<dyn SessionStore>>,
    address: Option<Address>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider,
            store: None,
            address: None,
        }
    }

    /// Record the wallet id in `store` on connect and clear it on disconnect.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Enable the provider and adopt its selected address.
    ///
    /// A failed attempt leaves the session as it was: an already connected
    /// session keeps its address and persisted wallet id, so a cancelled
    /// reconnect does not log the user out.
    pub async fn connect(&mut self, options: &ConnectOptions) -> Result<&Address> {
        let state = match self.provider.enable(options).await {
            Ok(state) => state,
            Err(ProviderError::UserRejected) => {
                log::info!("Wallet connection cancelled by user");
                return Err(ConnectionError::Cancelled.into());
            }
            Err(ProviderError::Unavailable) => {
                log::error!("Error connecting wallet: no provider available");
                return Err(ConnectionError::NoProvider.into());
            }
            Err(e) => {
                log::error!("Error connecting wallet: {}", e);
                return Err(ConnectionError::Provider(e.to_string()).into());
            }
        };

        if !state.is_connected {
            log::error!("Wallet did not report a connected state after enabling");
            return Err(ConnectionError::NotConnected.into());
        }
        let raw = state
            .selected_address
            .ok_or(ConnectionError::NotConnected)?;
        let address = Address::parse("selected_address", &raw).map_err(|_| {
            ConnectionError::Provider(format!("wallet reported an invalid address: {}", raw))
        })?;

        if let Some(store) = &self.store {
            store.set_wallet_id(address.as_str()).await?;
        }

        log::info!("Wallet connected. Address: {}", address);
        Ok(&*self.address.insert(address))
    }

    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    pub fn current_address(&self) -> Result<&Address> {
        self.address.as_ref().ok_or(LoopError::NotConnected)
    }

    /// Forget the connection. Safe to call repeatedly.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(address) = self.address.take() {
            log::info!("Wallet disconnected: {}", address);
        }
        if let Some(store) = &self.store {
            store.clear_wallet_id().await?;
        }
        Ok(())
    }

    /// Submit calls through the connected wallet.
    pub async fn execute(&self, calls: &[Call]) -> Result<TransactionHash> {
        self.current_address()?;
        Ok(self.provider.execute(calls).await?)
    }

    pub async fn get_transaction_receipt(&self, hash: &str) -> ProviderResult<Receipt> {
        self.provider.get_transaction_receipt(hash).await
    }

    pub async fn call_contract(&self, call: &Call) -> ProviderResult<Vec<Felt>> {
        self.provider.call_contract(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopkit_store::MemoryStore;

    const ACCOUNT: &str = "0x0123456789abcdef";

    #[tokio::test]
    async fn test_connect_reports_address_and_persists_wallet_id() {
        let provider = Arc::new(MemoryProvider::connected(ACCOUNT));
        let store = Arc::new(MemoryStore::new());
        let mut session = WalletSession::new(provider).with_store(store.clone());

        assert!(matches!(session.current_address(), Err(LoopError::NotConnected)));

        let address = session.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(address.as_str(), ACCOUNT);
        assert_eq!(store.get_wallet_id().await.unwrap().as_deref(), Some(ACCOUNT));

        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert!(!session.is_connected());
        assert_eq!(store.get_wallet_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_rejection_is_cancelled_not_generic() {
        let provider = Arc::new(MemoryProvider::connected(ACCOUNT));
        provider.set_enable_result(Err(ProviderError::UserRejected));
        let mut session = WalletSession::new(provider);

        let err = session.connect(&ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, LoopError::Connection(ConnectionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_connection_failures() {
        let provider = Arc::new(MemoryProvider::connected(ACCOUNT));
        let mut session = WalletSession::new(provider.clone());

        provider.set_enable_result(Err(ProviderError::Unavailable));
        let err = session.connect(&ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, LoopError::Connection(ConnectionError::NoProvider)));

        provider.set_enable_result(Ok(ProviderState {
            is_connected: false,
            selected_address: Some(ACCOUNT.into()),
        }));
        let err = session.connect(&ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, LoopError::Connection(ConnectionError::NotConnected)));

        provider.set_enable_result(Err(ProviderError::Rpc("boom".into())));
        let err = session.connect(&ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, LoopError::Connection(ConnectionError::Provider(_))));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_existing_session() {
        let provider = Arc::new(MemoryProvider::connected(ACCOUNT));
        let store = Arc::new(MemoryStore::new());
        let mut session = WalletSession::new(provider.clone()).with_store(store.clone());
        session.connect(&ConnectOptions::default()).await.unwrap();

        provider.set_enable_result(Err(ProviderError::UserRejected));
        let err = session.connect(&ConnectOptions::default()).await.unwrap_err();
        assert!(matches!(err, LoopError::Connection(ConnectionError::Cancelled)));

        assert!(session.is_connected());
        assert_eq!(session.current_address().unwrap().as_str(), ACCOUNT);
        assert_eq!(store.get_wallet_id().await.unwrap().as_deref(), Some(ACCOUNT));
    }

    #[tokio::test]
    async fn test_reconnect_switches_account() {
        let provider = Arc::new(MemoryProvider::connected(ACCOUNT));
        let store = Arc::new(MemoryStore::new());
        let mut session = WalletSession::new(provider.clone()).with_store(store.clone());
        session.connect(&ConnectOptions::default()).await.unwrap();

        provider.set_enable_result(Ok(ProviderState {
            is_connected: true,
            selected_address: Some("0xfeed".into()),
        }));
        let address = session.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(address.as_str(), "0xfeed");
        assert_eq!(store.get_wallet_id().await.unwrap().as_deref(), Some("0xfeed"));
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let provider = Arc::new(MemoryProvider::connected(ACCOUNT));
        let session = WalletSession::new(provider.clone());
        let call = Call {
            contract_address: Address::parse("contract", "0x1").unwrap(),
            entrypoint: "approve".into(),
            calldata: vec![],
        };

        assert!(matches!(session.execute(&[call]).await, Err(LoopError::NotConnected)));
        assert_eq!(provider.request_count(), 0);
    }

    #[test]
    fn test_connect_options_wire_names() {
        let json = serde_json::to_string(&ConnectOptions::default()).unwrap();
        assert_eq!(json, r#"{"modalMode":"alwaysAsk","modalTheme":"light"}"#);
    }
}
