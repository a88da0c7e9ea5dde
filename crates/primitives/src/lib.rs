#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod execution;
pub use execution::{
    decode_batch, decode_delegate, decode_single, encode_batch, encode_delegate, encode_single,
    Execution, ExecutionDecodeError,
};

pub mod mode;
pub use mode::{CallType, ExecType, ExecutionMode};

pub mod module;
pub use module::ModuleType;

pub mod operation;
pub use operation::{hash_operation, PackedOperation};

pub mod signer;
pub use signer::SignerId;

pub mod validation;
pub use validation::{ValidationData, SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCESS};
