#![doc = include_str!("../README.md")]

pub mod contracts;
pub use contracts::{CallRecorder, Reverter, StorageWriter};

pub mod env;
pub use env::{coordinator, test_env};

pub mod modules;
pub use modules::{MockFallbackHandler, MockHook, MockModule, SingleSignerValidator};

pub mod signing;
pub use signing::{multisig_signature, nonce_with_validator, signer_ids, sorted_random_keys};
