//! Packed validation results.
//!
//! A validation result packs an authorizer address and a validity window
//! into one word: `authorizer (160) | valid_until (48) << 160 |
//! valid_after (48) << 208`. The zero and one sentinels in the authorizer
//! slot mean unconditional success and signature failure respectively.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Canonical "signature valid" sentinel.
pub const SIG_VALIDATION_SUCCESS: U256 = U256::ZERO;

/// Canonical "signature invalid" sentinel. A soft outcome, not an error.
pub const SIG_VALIDATION_FAILED: U256 = U256::from_limbs([1, 0, 0, 0]);

const U48_MASK: u64 = (1 << 48) - 1;

/// A decoded validation result.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    /// Sentinel (zero = success, one = failure) or an aggregator address.
    pub authorizer: Address,
    /// Timestamp after which the operation is valid (0 = immediately).
    pub valid_after: u64,
    /// Timestamp until which the operation is valid (0 = indefinitely).
    pub valid_until: u64,
}

impl ValidationData {
    /// Packs this result into its single-word wire form.
    pub fn pack(&self) -> U256 {
        let authorizer = U256::from_be_slice(self.authorizer.as_slice());
        let valid_until = U256::from(self.valid_until & U48_MASK) << 160usize;
        let valid_after = U256::from(self.valid_after & U48_MASK) << 208usize;
        authorizer | valid_until | valid_after
    }

    /// Unpacks a single-word validation result.
    pub fn unpack(raw: U256) -> Self {
        let bytes = raw.to_be_bytes::<32>();
        let authorizer = Address::from_slice(&bytes[12..32]);
        let valid_until = (raw >> 160usize).as_limbs()[0] & U48_MASK;
        let valid_after = (raw >> 208usize).as_limbs()[0] & U48_MASK;
        Self { authorizer, valid_after, valid_until }
    }

    /// Whether this result is the unconditional success sentinel.
    pub fn is_success(&self) -> bool {
        self.pack() == SIG_VALIDATION_SUCCESS
    }
}
