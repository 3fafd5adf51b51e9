// Shared identity, time, and call types used across the governance engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Fixed-point scale for all threshold percentages: 10_000 == 100.00%.
pub const PRECISION: u128 = 10_000;

/// 20-byte account identity. Used for voters, proposal creators, executors,
/// call targets, and the governance engine itself.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The null identity. Assigning it to the guardian slot is permanent.
    pub fn zero() -> Self {
        Address([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Derive an address from an ed25519 verifying key: trailing 20 bytes
    /// of the SHA-256 digest of the key bytes.
    pub fn from_public_key(key_bytes: &[u8]) -> Self {
        let digest = Sha256::digest(key_bytes);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..32]);
        Address(out)
    }

    /// Compact constructor placing `value` in the trailing 8 bytes.
    pub fn from_low_u64(value: u64) -> Self {
        let mut out = [0u8; 20];
        out[12..20].copy_from_slice(&value.to_be_bytes());
        Address(out)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Externally supplied read-only clock pair: a monotonic block marker for
/// voting windows and power snapshots, and a monotonic timestamp for
/// timelock delays and grace windows. The engine only reads it, never
/// advances it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainContext {
    pub block_number: u64,
    pub timestamp: u64,
}

impl ChainContext {
    pub fn new(block_number: u64, timestamp: u64) -> Self {
        ChainContext {
            block_number,
            timestamp,
        }
    }
}

/// One sub-action of a proposal: an arbitrary privileged call performed by
/// the timelocked executor once the proposal passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionCall {
    /// Call target identity.
    pub target: Address,

    /// Value forwarded with the call.
    pub value: u128,

    /// Optional function signature string.
    pub signature: String,

    /// Opaque call data.
    pub data: Vec<u8>,

    /// Dispatch as a delegated call instead of a direct one.
    pub with_delegate_call: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_address() {
        assert!(Address::zero().is_zero());
        assert!(!Address::from_low_u64(1).is_zero());
    }

    #[test]
    fn test_address_display_is_hex() {
        let addr = Address::from_low_u64(0xabcd);
        let rendered = addr.to_string();
        assert!(rendered.starts_with("0x"));
        assert_eq!(rendered.len(), 42);
        assert!(rendered.ends_with("abcd"));
    }

    #[test]
    fn test_address_from_public_key_is_deterministic() {
        let key = [7u8; 32];
        assert_eq!(Address::from_public_key(&key), Address::from_public_key(&key));
        assert_ne!(Address::from_public_key(&key), Address::from_public_key(&[8u8; 32]));
    }
}
