//! End-to-end orchestration: connect, loop deposit, balances, dashboard, logout.
//!
//! Ties the wallet session, transaction submitter, balance reader, dashboard
//! client and session store together behind one engine.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use loopkit_balances::{read_own_balances, TokenBalanceSet};
use loopkit_dashboard::DashboardClient;
use loopkit_store::SessionStore;
use loopkit_tx::{LoopDepositReceipts, LoopDepositRequest, PollPolicy};
use loopkit_types::{Address, Result};
use loopkit_wallet::{ConnectOptions, HttpWalletProvider, WalletProvider, WalletSession};

pub mod config;

pub use config::{EngineConfig, PollConfig};

/// The loop engine owns one wallet session and the local session store.
pub struct LoopEngine {
    session: WalletSession,
    store: Arc<dyn SessionStore>,
    dashboard: DashboardClient,
    config: EngineConfig,
    poll_policy: PollPolicy,
}

impl LoopEngine {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        let poll_policy = config.poll.to_policy()?;
        let dashboard =
            DashboardClient::new(&config.dashboard_url, Some(config.request_timeout_ms));
        let session = WalletSession::new(provider).with_store(store.clone());

        Ok(Self {
            session,
            store,
            dashboard,
            config,
            poll_policy,
        })
    }

    /// Engine talking to the wallet bridge and RPC node named in `config`.
    pub fn with_http(store: Arc<dyn SessionStore>, config: EngineConfig) -> Result<Self> {
        let provider = HttpWalletProvider::new(
            &config.bridge_url,
            &config.rpc_url,
            Some(config.request_timeout_ms),
        );
        Self::new(Arc::new(provider), store, config)
    }

    pub async fn init(&self) -> Result<()> {
        self.store.init().await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    /// Connect the wallet and record its wallet id.
    pub async fn connect(&mut self, options: &ConnectOptions) -> Result<Address> {
        Ok(self.session.connect(options).await?.clone())
    }

    /// The persisted wallet id, if any.
    pub async fn wallet_id(&self) -> Result<Option<String>> {
        self.store.get_wallet_id().await
    }

    pub async fn submit_loop_deposit(
        &self,
        request: &LoopDepositRequest,
        cancel: &CancellationToken,
    ) -> Result<LoopDepositReceipts> {
        loopkit_tx::submit_loop_deposit(&self.session, request, &self.poll_policy, cancel).await
    }

    pub async fn token_balances(&self) -> Result<TokenBalanceSet> {
        read_own_balances(&self.session, &self.config.tokens).await
    }

    /// Dashboard data for the persisted wallet id. `None` when logged out.
    pub async fn dashboard(&self) -> Result<Option<Value>> {
        let wallet_id = self.store.get_wallet_id().await?;
        self.dashboard.fetch(wallet_id.as_deref()).await
    }

    /// Disconnect and clear the persisted wallet id.
    pub async fn logout(&mut self) -> Result<()> {
        self.session.disconnect().await?;
        log::info!("Logged out");
        Ok(())
    }
}
