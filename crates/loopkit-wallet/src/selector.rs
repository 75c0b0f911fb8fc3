//! Entrypoint name → selector (`starknet_keccak`).

use alloy_primitives::U256;
use sha3::{Digest, Keccak256};

/// Keccak-256 of the name, truncated to the low 250 bits, as 0x-hex.
pub fn get_selector_from_name(name: &str) -> String {
    let mut hash: [u8; 32] = Keccak256::digest(name.as_bytes()).into();
    hash[0] &= 0x03;
    format!("{:#x}", U256::from_be_bytes(hash))
}
