//! Waits for a submitted transaction to reach finality.
//!
//! Receipt queries are retried under a `PollPolicy`; every suspension point
//! (query and delay) also watches a `CancellationToken`.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use loopkit_types::{FinalityStatus, LoopError, ProviderError, Receipt, Result};
use loopkit_wallet::WalletSession;

/// Delay growth between receipt queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles after every failed attempt, capped at `max_interval`.
    Exponential { max_interval: Duration },
}

/// Retry policy for confirmation polling.
///
/// With both `max_attempts` and `timeout` unset, polling never gives up on
/// its own and only cancellation ends it. When the next delay would run past
/// `timeout`, the poller sleeps until the deadline and queries one last time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub backoff: Backoff,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5_000),
            backoff: Backoff::Fixed,
            max_attempts: Some(120),
            timeout: None,
        }
    }
}

impl PollPolicy {
    /// Fixed delay, no attempt limit, no deadline.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            backoff: Backoff::Fixed,
            max_attempts: None,
            timeout: None,
        }
    }

    /// Delay to wait after the `attempt`-th query (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max_interval } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                self.interval.saturating_mul(factor).min(max_interval)
            }
        }
    }
}

/// A receipt query outcome that only drives another attempt.
#[derive(Debug, Error)]
enum TransientPollError {
    #[error("transaction not yet known")]
    NotYetKnown,

    #[error("transaction is {0:?}, not yet accepted")]
    NotFinal(FinalityStatus),

    #[error(transparent)]
    Provider(ProviderError),
}

fn classify(
    result: std::result::Result<Receipt, ProviderError>,
) -> std::result::Result<Receipt, TransientPollError> {
    match result {
        Ok(receipt) if receipt.is_accepted() || receipt.is_reverted() => Ok(receipt),
        Ok(receipt) => Err(TransientPollError::NotFinal(receipt.finality_status)),
        Err(ProviderError::TransactionNotFound(_)) => Err(TransientPollError::NotYetKnown),
        Err(e) => Err(TransientPollError::Provider(e)),
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Poll for the receipt of `hash` until it is accepted.
///
/// Fails with `Reverted` if the transaction is rejected or reverts,
/// `Timeout` when the policy runs out and `Cancelled` when `cancel` fires.
pub async fn await_finality(
    session: &WalletSession,
    hash: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<Receipt> {
    let mut deadline = policy.timeout.map(|t| Instant::now() + t);
    let mut final_attempt = false;
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(LoopError::Cancelled(hash.to_string()));
        }
        attempts += 1;
        log::debug!("Querying receipt for {} (attempt {})", hash, attempts);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoopError::Cancelled(hash.to_string())),
            _ = deadline_reached(deadline) => {
                return Err(LoopError::Timeout { hash: hash.to_string(), attempts });
            }
            result = session.get_transaction_receipt(hash) => result,
        };

        match classify(result) {
            Ok(receipt) if receipt.is_reverted() => {
                let reason = receipt
                    .revert_reason
                    .unwrap_or_else(|| format!("{:?}", receipt.finality_status));
                log::error!("Transaction {} reverted: {}", hash, reason);
                return Err(LoopError::Reverted {
                    hash: hash.to_string(),
                    reason,
                });
            }
            Ok(receipt) => {
                log::info!("Transaction accepted: {} ({:?})", hash, receipt.finality_status);
                return Ok(receipt);
            }
            Err(e) => log::info!("Waiting for transaction {} to be accepted... {}", hash, e),
        }

        if final_attempt || policy.max_attempts.is_some_and(|max| attempts >= max) {
            log::warn!("Giving up on {} after {} attempts", hash, attempts);
            return Err(LoopError::Timeout {
                hash: hash.to_string(),
                attempts,
            });
        }

        let mut delay = policy.delay_after(attempts);
        if let Some(d) = deadline {
            let now = Instant::now();
            if now >= d {
                log::warn!("Deadline for {} passed after {} attempts", hash, attempts);
                return Err(LoopError::Timeout {
                    hash: hash.to_string(),
                    attempts,
                });
            }
            if now + delay >= d {
                // last query lands on the deadline and is not raced against it
                delay = d - now;
                deadline = None;
                final_attempt = true;
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoopError::Cancelled(hash.to_string())),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
