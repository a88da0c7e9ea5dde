#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod delayed_executor;
pub use delayed_executor::{
    DelayedExecutor, ExecutorError, ExecutorEvent, OperationState, DEFAULT_DELAY,
    DEFAULT_EXPIRATION,
};

pub mod multisig_validator;
pub use multisig_validator::{MultisigValidator, ValidatorError};
