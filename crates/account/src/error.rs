//! Hard failures of the account core.
//!
//! These abort the whole call and carry the offending value. Signature and
//! threshold verification failures are never errors; they surface as the
//! failed-validation sentinel or, under try execution, as events.

use alloy_primitives::{Address, Bytes, FixedBytes};
use msa_primitives::ModuleType;

/// Errors returned by the account core's entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    /// The caller is not allowed to invoke this entry point.
    #[error("unauthorized caller {0}")]
    Unauthorized(Address),
    /// No account record exists at this address.
    #[error("unknown account {0}")]
    UnknownAccount(Address),
    /// No module contract is deployed at this address.
    #[error("unknown module {0}")]
    UnknownModule(Address),
    /// The module type id is not one of the four known roles.
    #[error("unsupported module type {0}")]
    UnsupportedModuleType(u32),
    /// The module does not identify as the requested type.
    #[error("module {1} does not identify as {0:?}")]
    ModuleTypeMismatch(ModuleType, Address),
    /// A module is already installed under this key.
    #[error("module {1} already installed as {0:?}")]
    AlreadyInstalled(ModuleType, Address),
    /// Accounts carry at most one hook.
    #[error("hook already installed: {0}")]
    HookAlreadyInstalled(Address),
    /// No module is installed under this key.
    #[error("module {1} not installed as {0:?}")]
    NotInstalled(ModuleType, Address),
    /// Install or uninstall data does not match the role's layout.
    #[error("malformed module data")]
    InvalidModuleData,
    /// The mode descriptor names an unknown call topology.
    #[error("unsupported call type {0:#04x}")]
    UnsupportedCallType(u8),
    /// The mode descriptor names an unknown failure policy.
    #[error("unsupported exec type {0:#04x}")]
    UnsupportedExecType(u8),
    /// The operation's nonce sequence does not match the stored counter.
    #[error("invalid nonce: expected sequence {expected}, got {got}")]
    InvalidNonce {
        /// The stored counter for the operation's nonce key.
        expected: u64,
        /// The sequence the operation carried.
        got: u64,
    },
    /// No fallback module is registered for the selector.
    #[error("no fallback handler for selector {0}")]
    MissingFallbackHandler(FixedBytes<4>),
    /// A sub-call reverted under abort semantics; payload is unmodified.
    #[error("execution failed: {0}")]
    ExecutionFailed(Bytes),
    /// A module lifecycle or hook callback reverted.
    #[error("module callback failed: {0}")]
    ModuleCallbackFailed(Bytes),
}
