//! Interfaces between the account core and its surroundings.

use alloy_primitives::{Address, Bytes, B256, U256};
use msa_primitives::{ModuleType, PackedOperation};

use crate::environment::Environment;

/// Code deployed at a plain call target.
///
/// The closure receives a scoped view of the environment: the storage
/// namespace it runs against and basic call metadata. Returning `Err`
/// reverts the sub-call; the payload is bubbled unmodified.
pub trait ContractCode: Send {
    /// Executes the contract with `data` as call data.
    fn call(&self, ctx: &mut CallScope<'_>, data: &[u8]) -> Result<Bytes, Bytes>;
}

/// The view of the environment a contract runs against.
pub struct CallScope<'a> {
    /// The address whose code is running.
    pub code_address: Address,
    /// The address whose storage namespace is in use. Differs from
    /// `code_address` under delegated execution.
    pub this: Address,
    /// The immediate caller.
    pub caller: Address,
    /// Native value attached to the call.
    pub value: U256,
    /// Current clock reading.
    pub timestamp: u64,
    /// The storage namespace of `this`.
    pub storage: &'a mut std::collections::HashMap<B256, B256>,
}

/// A module contract, installable into an account in one or more roles.
///
/// Modules are invoked with exclusive access to the environment (the core
/// removes them from the module table for the duration of the call), so a
/// module that needs to be driven externally as well should keep its state
/// behind a shared handle.
pub trait ModuleContract: Send {
    /// Whether the module can act in the given role.
    fn is_module_type(&self, module_type: ModuleType) -> bool;

    /// Called after the module is recorded on an account. `Err` carries a
    /// revert payload and aborts the install.
    fn on_install(
        &mut self,
        env: &mut Environment,
        account: Address,
        data: &[u8],
    ) -> Result<(), Bytes>;

    /// Called after the module is removed from an account.
    fn on_uninstall(
        &mut self,
        env: &mut Environment,
        account: Address,
        data: &[u8],
    ) -> Result<(), Bytes>;

    /// Validator capability, if the module verifies operations.
    fn as_validator(&mut self) -> Option<&mut dyn ValidatorModule> {
        None
    }

    /// Fallback capability, if the module handles unmatched selectors.
    fn as_fallback(&mut self) -> Option<&mut dyn FallbackModule> {
        None
    }

    /// Hook capability, if the module brackets account entry points.
    fn as_hook(&mut self) -> Option<&mut dyn HookModule> {
        None
    }
}

/// A module that verifies operations on behalf of an account.
pub trait ValidatorModule {
    /// Returns packed validation data for the operation. Invalid signatures
    /// are the failure sentinel, never a panic or error.
    fn validate_operation(
        &mut self,
        env: &mut Environment,
        account: Address,
        op: &PackedOperation,
        op_hash: B256,
    ) -> U256;
}

/// A module handling calls whose selector no account function matches.
pub trait FallbackModule {
    /// Handles the call. `Err` carries the revert payload to bubble.
    fn handle(
        &mut self,
        env: &mut Environment,
        account: Address,
        caller: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Bytes>;
}

/// A module bracketing the account's mutating entry points.
pub trait HookModule {
    /// Runs before the wrapped entry point; the returned context is handed
    /// back to [`HookModule::post_check`]. `Err` aborts the entry point.
    fn pre_check(
        &mut self,
        env: &mut Environment,
        account: Address,
        caller: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Bytes>;

    /// Runs after the wrapped entry point succeeded.
    fn post_check(&mut self, env: &mut Environment, account: Address, context: &[u8])
        -> Result<(), Bytes>;
}
