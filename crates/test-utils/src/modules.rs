//! Mock modules for every account role, with inspectable call records.

use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use msa_account::{Environment, FallbackModule, HookModule, ModuleContract, ValidatorModule};
use msa_primitives::{
    ModuleType, PackedOperation, SignerId, SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCESS,
};
use msa_signatures::is_valid_signature_now;

/// A module claiming any configured set of roles, recording lifecycle
/// callbacks. Clone it before registering to keep an inspection handle.
#[derive(Clone, Default)]
pub struct MockModule {
    types: Vec<ModuleType>,
    fail_install: bool,
    state: Arc<Mutex<MockModuleState>>,
}

#[derive(Default)]
struct MockModuleState {
    installs: Vec<(Address, Bytes)>,
    uninstalls: Vec<(Address, Bytes)>,
}

impl MockModule {
    /// A module identifying as the given roles.
    pub fn new(types: impl IntoIterator<Item = ModuleType>) -> Self {
        Self { types: types.into_iter().collect(), ..Default::default() }
    }

    /// Makes `on_install` revert.
    pub fn with_failing_install(mut self) -> Self {
        self.fail_install = true;
        self
    }

    /// `(account, data)` pairs seen by `on_install`.
    pub fn installs(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().installs.clone()
    }

    /// `(account, data)` pairs seen by `on_uninstall`.
    pub fn uninstalls(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().uninstalls.clone()
    }
}

impl ModuleContract for MockModule {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        self.types.contains(&module_type)
    }

    fn on_install(
        &mut self,
        _env: &mut Environment,
        account: Address,
        data: &[u8],
    ) -> Result<(), Bytes> {
        if self.fail_install {
            return Err(Bytes::from_static(b"install rejected"));
        }
        self.state.lock().unwrap().installs.push((account, Bytes::copy_from_slice(data)));
        Ok(())
    }

    fn on_uninstall(
        &mut self,
        _env: &mut Environment,
        account: Address,
        data: &[u8],
    ) -> Result<(), Bytes> {
        self.state.lock().unwrap().uninstalls.push((account, Bytes::copy_from_slice(data)));
        Ok(())
    }
}

/// A hook recording every pre/post bracket.
#[derive(Clone, Default)]
pub struct MockHook {
    state: Arc<Mutex<MockHookState>>,
}

#[derive(Default)]
struct MockHookState {
    pre: Vec<(Address, Address, U256, Bytes)>,
    post: Vec<(Address, Bytes)>,
}

impl MockHook {
    /// A fresh hook with no recorded brackets.
    pub fn new() -> Self {
        Self::default()
    }

    /// `(account, caller, value, data)` tuples seen by `pre_check`.
    pub fn pre_checks(&self) -> Vec<(Address, Address, U256, Bytes)> {
        self.state.lock().unwrap().pre.clone()
    }

    /// `(account, context)` pairs seen by `post_check`.
    pub fn post_checks(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().post.clone()
    }
}

impl ModuleContract for MockHook {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Hook
    }

    fn on_install(&mut self, _: &mut Environment, _: Address, _: &[u8]) -> Result<(), Bytes> {
        Ok(())
    }

    fn on_uninstall(&mut self, _: &mut Environment, _: Address, _: &[u8]) -> Result<(), Bytes> {
        Ok(())
    }

    fn as_hook(&mut self) -> Option<&mut dyn HookModule> {
        Some(self)
    }
}

impl HookModule for MockHook {
    fn pre_check(
        &mut self,
        _env: &mut Environment,
        account: Address,
        caller: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Bytes> {
        let data = Bytes::copy_from_slice(data);
        self.state.lock().unwrap().pre.push((account, caller, value, data));
        // Hand the caller back as the hook context.
        Ok(Bytes::copy_from_slice(caller.as_slice()))
    }

    fn post_check(
        &mut self,
        _env: &mut Environment,
        account: Address,
        context: &[u8],
    ) -> Result<(), Bytes> {
        self.state.lock().unwrap().post.push((account, Bytes::copy_from_slice(context)));
        Ok(())
    }
}

/// A fallback handler echoing call data, with an optional forced revert.
#[derive(Clone, Default)]
pub struct MockFallbackHandler {
    revert_with: Option<Bytes>,
    calls: Arc<Mutex<Vec<(Address, Address, Bytes)>>>,
}

impl MockFallbackHandler {
    /// An echoing handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler reverting every call with `payload`.
    pub fn reverting(payload: &'static [u8]) -> Self {
        Self { revert_with: Some(Bytes::from_static(payload)), ..Default::default() }
    }

    /// `(account, caller, data)` triples handled so far.
    pub fn calls(&self) -> Vec<(Address, Address, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ModuleContract for MockFallbackHandler {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Fallback
    }

    fn on_install(&mut self, _: &mut Environment, _: Address, _: &[u8]) -> Result<(), Bytes> {
        Ok(())
    }

    fn on_uninstall(&mut self, _: &mut Environment, _: Address, _: &[u8]) -> Result<(), Bytes> {
        Ok(())
    }

    fn as_fallback(&mut self) -> Option<&mut dyn FallbackModule> {
        Some(self)
    }
}

impl FallbackModule for MockFallbackHandler {
    fn handle(
        &mut self,
        _env: &mut Environment,
        account: Address,
        caller: Address,
        _value: U256,
        data: &[u8],
    ) -> Result<Bytes, Bytes> {
        if let Some(payload) = &self.revert_with {
            return Err(payload.clone());
        }
        let data = Bytes::copy_from_slice(data);
        self.calls.lock().unwrap().push((account, caller, data.clone()));
        Ok(data)
    }
}

/// A validator module accepting operations signed by one fixed key.
#[derive(Clone)]
pub struct SingleSignerValidator {
    signer: Address,
}

impl SingleSignerValidator {
    /// Accepts signatures recoverable to `signer`.
    pub fn new(signer: Address) -> Self {
        Self { signer }
    }
}

impl ModuleContract for SingleSignerValidator {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Validator
    }

    fn on_install(&mut self, _: &mut Environment, _: Address, _: &[u8]) -> Result<(), Bytes> {
        Ok(())
    }

    fn on_uninstall(&mut self, _: &mut Environment, _: Address, _: &[u8]) -> Result<(), Bytes> {
        Ok(())
    }

    fn as_validator(&mut self) -> Option<&mut dyn ValidatorModule> {
        Some(self)
    }
}

impl ValidatorModule for SingleSignerValidator {
    fn validate_operation(
        &mut self,
        env: &mut Environment,
        _account: Address,
        op: &PackedOperation,
        op_hash: B256,
    ) -> U256 {
        let signer = SignerId::native(self.signer);
        if is_valid_signature_now(&*env, &signer, op_hash, &op.signature) {
            SIG_VALIDATION_SUCCESS
        } else {
            SIG_VALIDATION_FAILED
        }
    }
}
