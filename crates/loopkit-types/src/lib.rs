use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// String-encoded Starknet field element as it appears in calldata.
pub type Felt = String;

/// 0x-prefixed transaction hash assigned by the provider on submission.
pub type TransactionHash = String;

/// Stark field prime `P = 2^251 + 17 * 2^192 + 1`.
pub const FIELD_PRIME: U256 = U256::from_limbs([1, 0, 0, 0x0800_0000_0000_0011]);

/// Loopkit error types.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("missing or invalid field: {0}")]
    Validation(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("wallet not connected")]
    NotConnected,

    #[error("provider call failed: {0}")]
    ProviderCall(#[from] ProviderError),

    #[error("transaction {hash} not accepted after {attempts} attempts")]
    Timeout {
        hash: TransactionHash,
        attempts: u32,
    },

    #[error("cancelled while waiting for transaction {0}")]
    Cancelled(TransactionHash),

    #[error("transaction {hash} reverted: {reason}")]
    Reverted {
        hash: TransactionHash,
        reason: String,
    },

    #[error("http error: {0}")]
    Http(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, LoopError>;

/// Why a wallet connection attempt failed.
///
/// `Cancelled` is kept apart so callers can show a "cancelled" message
/// instead of a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("no wallet provider available")]
    NoProvider,

    #[error("wallet connection cancelled by user")]
    Cancelled,

    #[error("wallet did not report a connected state after enabling")]
    NotConnected,

    #[error("failed to connect to wallet: {0}")]
    Provider(String),
}

/// Structured errors reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no wallet provider available")]
    Unavailable,

    #[error("request rejected by user")]
    UserRejected,

    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionHash),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A Starknet contract address (or any felt-sized account identifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse a 0x-prefixed hex address. `field` names the request field in
    /// the validation error.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(LoopError::Validation(field.to_string()));
        }
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| LoopError::Validation(format!("{field}: address must start with 0x")))?;

        if digits.is_empty() || digits.len() > 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LoopError::Validation(format!("{field}: invalid address {trimmed}")));
        }

        let value = U256::from_str_radix(digits, 16)
            .map_err(|e| LoopError::Validation(format!("{field}: {e}")))?;
        if value >= FIELD_PRIME {
            return Err(LoopError::Validation(format!(
                "{field}: address {trimmed} is not a field element"
            )));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single contract invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub contract_address: Address,
    pub entrypoint: String,
    pub calldata: Vec<Felt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalityStatus {
    Received,
    #[default]
    AcceptedOnL2,
    AcceptedOnL1,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Succeeded,
    Reverted,
}

/// Transaction receipt returned once the provider knows the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: TransactionHash,
    #[serde(default)]
    pub finality_status: FinalityStatus,
    #[serde(default)]
    pub execution_status: ExecutionStatus,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub revert_reason: Option<String>,
}

impl Receipt {
    /// An accepted, successfully executed receipt.
    pub fn accepted(transaction_hash: impl Into<TransactionHash>) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            finality_status: FinalityStatus::AcceptedOnL2,
            execution_status: ExecutionStatus::Succeeded,
            block_number: None,
            revert_reason: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self.finality_status,
            FinalityStatus::AcceptedOnL2 | FinalityStatus::AcceptedOnL1
        )
    }

    pub fn is_reverted(&self) -> bool {
        self.execution_status == ExecutionStatus::Reverted
            || self.finality_status == FinalityStatus::Rejected
    }
}
