//! Environment builders with a fixed coordinator.

use alloy_primitives::{address, Address};
use msa_account::Environment;

/// The trusted coordinator address every test environment uses.
pub fn coordinator() -> Address {
    address!("66a15edcc3b50a663e72f1457ffd49b9ae284ddc")
}

/// An empty environment on a local chain id, clock at zero.
pub fn test_env() -> Environment {
    Environment::new(coordinator(), 31337)
}
