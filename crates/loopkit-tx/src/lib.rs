//! Loop-liquidity transaction workflow.
//!
//! - Validate the approve / deposit request payload
//! - Build the `approve` and `deposit` calls
//! - Submit them in order, waiting for finality in between

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use loopkit_codec::{to_felt, to_fixed_width_pair, Uint256Limbs};
use loopkit_types::{Address, Call, Felt, LoopError, Result, TransactionHash};
use loopkit_wallet::WalletSession;

pub mod poller;

pub use poller::{await_finality, Backoff, PollPolicy};

pub const APPROVE_ENTRYPOINT: &str = "approve";
pub const DEPOSIT_ENTRYPOINT: &str = "deposit";

/// A numeric request value: JSON string (decimal or 0x-hex) or JSON number.
///
/// JSON numbers keep their literal digits, so integers beyond 64 bits reach
/// the codec unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amount {
    Text(String),
    Number(String),
}

impl Amount {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Amount::Text(s) | Amount::Number(s) => Cow::Borrowed(s.trim()),
        }
    }
}

impl From<&str> for Amount {
    fn from(s: &str) -> Self {
        Amount::Text(s.to_string())
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Amount::Text(s) => serializer.serialize_str(s),
            Amount::Number(digits) => match digits.parse::<serde_json::Number>() {
                Ok(number) => number.serialize(serializer),
                Err(_) => serializer.serialize_str(digits),
            },
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Amount::Text(s)),
            serde_json::Value::Number(n) => Ok(Amount::Number(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected a string or number amount, got {}",
                other
            ))),
        }
    }
}

/// `approve_data`: token approval for the deposit contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub to_address: Option<String>,
    pub spender: Option<String>,
    pub amount: Option<Amount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolKey {
    pub token0: Option<String>,
    pub token1: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositData {
    pub amount: Option<Amount>,
    pub multiplier: Option<Amount>,
}

/// `loop_liquidity_data`: the deposit into the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub pool_key: Option<PoolKey>,
    pub deposit_data: Option<DepositData>,
}

/// The full payload handed over by the back-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopDepositRequest {
    pub approve_data: Option<ApprovalRequest>,
    pub loop_liquidity_data: Option<DepositRequest>,
}

/// Hashes of the two submitted transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopDepositReceipts {
    pub approve_hash: TransactionHash,
    pub deposit_hash: TransactionHash,
}

/// Both calls, validated and encoded, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDepositPlan {
    pub approve: Call,
    pub deposit: Call,
}

struct ApprovalFields<'a> {
    to_address: Address,
    spender: Address,
    amount: Cow<'a, str>,
}

struct DepositFields<'a> {
    token0: Address,
    token1: Address,
    amount: Cow<'a, str>,
    multiplier: Cow<'a, str>,
}

fn required<'a, T>(field: &str, value: Option<&'a T>) -> Result<&'a T> {
    value.ok_or_else(|| LoopError::Validation(field.to_string()))
}

fn required_address(field: &str, value: Option<&String>) -> Result<Address> {
    Address::parse(field, required(field, value)?)
}

fn required_amount<'a>(field: &str, value: Option<&'a Amount>) -> Result<Cow<'a, str>> {
    let text = required(field, value)?.as_text();
    if text.is_empty() {
        return Err(LoopError::Validation(field.to_string()));
    }
    Ok(text)
}

impl ApprovalRequest {
    fn fields(&self) -> Result<ApprovalFields<'_>> {
        Ok(ApprovalFields {
            to_address: required_address("approve_data.to_address", self.to_address.as_ref())?,
            spender: required_address("approve_data.spender", self.spender.as_ref())?,
            amount: required_amount("approve_data.amount", self.amount.as_ref())?,
        })
    }
}

impl DepositRequest {
    fn fields(&self) -> Result<DepositFields<'_>> {
        let pool_key = required("loop_liquidity_data.pool_key", self.pool_key.as_ref())?;
        let deposit_data =
            required("loop_liquidity_data.deposit_data", self.deposit_data.as_ref())?;

        Ok(DepositFields {
            token0: required_address(
                "loop_liquidity_data.pool_key.token0",
                pool_key.token0.as_ref(),
            )?,
            token1: required_address(
                "loop_liquidity_data.pool_key.token1",
                pool_key.token1.as_ref(),
            )?,
            amount: required_amount(
                "loop_liquidity_data.deposit_data.amount",
                deposit_data.amount.as_ref(),
            )?,
            multiplier: required_amount(
                "loop_liquidity_data.deposit_data.multiplier",
                deposit_data.multiplier.as_ref(),
            )?,
        })
    }
}

/// `approve(spender, amount: u256)` on the token contract.
pub fn build_approve_call(token: &Address, spender: &Address, amount: &Uint256Limbs) -> Call {
    let [low, high] = amount.to_calldata();
    Call {
        contract_address: token.clone(),
        entrypoint: APPROVE_ENTRYPOINT.to_string(),
        calldata: vec![spender.to_string(), low, high],
    }
}

/// `deposit(token0, token1, amount: u256, multiplier)`, sent to `token0`.
pub fn build_deposit_call(
    token0: &Address,
    token1: &Address,
    amount: &Uint256Limbs,
    multiplier: Felt,
) -> Call {
    let [low, high] = amount.to_calldata();
    Call {
        contract_address: token0.clone(),
        entrypoint: DEPOSIT_ENTRYPOINT.to_string(),
        calldata: vec![token0.to_string(), token1.to_string(), low, high, multiplier],
    }
}

impl LoopDepositRequest {
    /// Validate every field, then encode every number.
    ///
    /// Both calls are fully built before anything is submitted, so a bad
    /// deposit amount never leaves a dangling approval behind.
    pub fn prepare(&self) -> Result<LoopDepositPlan> {
        let approval = required("approve_data", self.approve_data.as_ref())?.fields()?;
        let deposit =
            required("loop_liquidity_data", self.loop_liquidity_data.as_ref())?.fields()?;

        let approve_amount = to_fixed_width_pair(&approval.amount)?;
        let deposit_amount = to_fixed_width_pair(&deposit.amount)?;
        let multiplier = to_felt(&deposit.multiplier)?;

        Ok(LoopDepositPlan {
            approve: build_approve_call(&approval.to_address, &approval.spender, &approve_amount),
            deposit: build_deposit_call(&deposit.token0, &deposit.token1, &deposit_amount, multiplier),
        })
    }
}

async fn submit(session: &WalletSession, call: &Call) -> Result<TransactionHash> {
    match session.execute(std::slice::from_ref(call)).await {
        Ok(hash) => {
            log::info!("{} transaction submitted: {}", call.entrypoint, hash);
            Ok(hash)
        }
        Err(e) => {
            log::error!("Error sending {} transaction: {}", call.entrypoint, e);
            Err(e)
        }
    }
}

/// Approve, wait for finality, deposit, wait for finality.
///
/// The deposit is never submitted before the approval receipt is observed.
pub async fn submit_loop_deposit(
    session: &WalletSession,
    request: &LoopDepositRequest,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<LoopDepositReceipts> {
    let plan = request.prepare()?;
    session.current_address()?;

    let approve_hash = submit(session, &plan.approve).await?;
    await_finality(session, &approve_hash, policy, cancel).await?;

    let deposit_hash = submit(session, &plan.deposit).await?;
    await_finality(session, &deposit_hash, policy, cancel).await?;

    Ok(LoopDepositReceipts {
        approve_hash,
        deposit_hash,
    })
}
