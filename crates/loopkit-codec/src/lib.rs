//! Fixed-width numeric encoding for Starknet calldata.
//!
//! - `u256` amounts split into `(low, high)` 128-bit limbs
//! - single-felt encoding for scalar arguments
//! - exact decimal formatting of raw token amounts

use alloy_primitives::U256;
use loopkit_types::{Felt, LoopError, Result, FIELD_PRIME};

/// A 256-bit unsigned integer as two 128-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uint256Limbs {
    pub low: u128,
    pub high: u128,
}

impl Uint256Limbs {
    pub fn from_u256(value: U256) -> Self {
        let limbs = value.as_limbs();
        Self {
            low: u128::from(limbs[0]) | (u128::from(limbs[1]) << 64),
            high: u128::from(limbs[2]) | (u128::from(limbs[3]) << 64),
        }
    }

    /// `high * 2^128 + low`.
    pub fn recompose(&self) -> U256 {
        U256::from_limbs([
            self.low as u64,
            (self.low >> 64) as u64,
            self.high as u64,
            (self.high >> 64) as u64,
        ])
    }

    /// Decimal-string limbs in calldata order: `[low, high]`.
    pub fn to_calldata(&self) -> [Felt; 2] {
        [self.low.to_string(), self.high.to_string()]
    }
}

/// Parse a non-negative integer given in decimal or 0x-prefixed hex.
pub fn parse_integer(amount: &str) -> Result<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(LoopError::Encoding("empty amount".into()));
    }
    if trimmed.starts_with('-') {
        return Err(LoopError::Encoding(format!("negative amount: {trimmed}")));
    }

    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16u64),
        None => (trimmed, 10u64),
    };

    let valid = !digits.is_empty()
        && digits.chars().all(|c| match radix {
            16 => c.is_ascii_hexdigit(),
            _ => c.is_ascii_digit(),
        });
    if !valid {
        return Err(LoopError::Encoding(format!("not an integer: {trimmed}")));
    }

    // Digits are already checked, so a parse failure can only be overflow.
    U256::from_str_radix(digits, radix)
        .map_err(|_| LoopError::Encoding(format!("amount {trimmed} exceeds 2^256 - 1")))
}

/// Split an amount into its canonical `u256` limbs.
///
/// Fails for negative input, non-integers and values of 2^256 or more.
pub fn to_fixed_width_pair(amount: &str) -> Result<Uint256Limbs> {
    parse_integer(amount).map(Uint256Limbs::from_u256)
}

/// Parse a field element given in decimal or 0x-prefixed hex.
pub fn parse_felt(raw: &str) -> Result<U256> {
    let value = parse_integer(raw)?;
    if value >= FIELD_PRIME {
        return Err(LoopError::Encoding(format!(
            "value {} does not fit in a field element",
            raw.trim()
        )));
    }
    Ok(value)
}

/// Encode an amount as a single felt (decimal string).
pub fn to_felt(amount: &str) -> Result<Felt> {
    parse_felt(amount).map(|value| value.to_string())
}

/// Re-encode a decimal or hex felt as canonical 0x-prefixed lowercase hex.
pub fn felt_to_hex(raw: &str) -> Result<String> {
    parse_felt(raw).map(|value| format!("{value:#x}"))
}

/// Decode a `u256` returned by a contract call.
///
/// Providers return either the full value as one element or `[low, high]`.
pub fn decode_u256(result: &[Felt]) -> Result<U256> {
    match result {
        [] => Err(LoopError::Encoding("empty call result".into())),
        [single] => parse_integer(single),
        [low, high, ..] => {
            let low = parse_limb(low)?;
            let high = parse_limb(high)?;
            Ok(Uint256Limbs { low, high }.recompose())
        }
    }
}

fn parse_limb(raw: &str) -> Result<u128> {
    let value = parse_integer(raw)?;
    if value > U256::from(u128::MAX) {
        return Err(LoopError::Encoding(format!("limb {raw} exceeds 128 bits")));
    }
    Ok(Uint256Limbs::from_u256(value).low)
}

fn pow10(exp: u32) -> U256 {
    let ten = U256::from(10u8);
    (0..exp).fold(U256::from(1u8), |acc, _| acc.saturating_mul(ten))
}

/// Format a raw token amount with `decimals` places, rounded half-up to
/// `precision` fraction digits.
pub fn format_units(raw: U256, decimals: u32, precision: u32) -> String {
    let precision = precision.min(decimals);
    let divisor = pow10(decimals - precision);

    let mut scaled = raw / divisor;
    let remainder = raw % divisor;
    if remainder * U256::from(2u8) >= divisor {
        scaled += U256::from(1u8);
    }

    if precision == 0 {
        return scaled.to_string();
    }

    let unit = pow10(precision);
    let whole = scaled / unit;
    let frac = scaled % unit;
    format!(
        "{}.{:0>width$}",
        whole,
        frac.to_string(),
        width = precision as usize
    )
}
