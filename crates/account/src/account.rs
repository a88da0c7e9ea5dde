//! The account core: module lifecycle, execution dispatch, and operation
//! validation over arena-style per-account records.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use alloy_sol_types::SolValue;
use msa_multisig::SignerSet;
use msa_primitives::{
    decode_batch, decode_delegate, decode_single, hash_operation, CallType, ExecType,
    ExecutionDecodeError, ExecutionMode, ModuleType, PackedOperation, SignerId, ValidationData,
    SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCESS,
};
use tracing::{debug, warn};

use crate::{environment::Environment, error::AccountError, events::AccountEvent};

/// Per-account state: the embedded signer set, namespaced nonce counters,
/// and the modules installed in each role.
#[derive(Default)]
struct AccountRecord {
    signer_set: SignerSet,
    nonces: HashMap<U256, u64>,
    validators: BTreeSet<Address>,
    executors: BTreeSet<Address>,
    fallbacks: HashMap<FixedBytes<4>, Address>,
    hook: Option<Address>,
}

/// The validation-and-execution core, holding every registered account.
///
/// All tables are keyed by account address; there is no ambient global
/// state. Every public entry point re-checks authorization, so re-entrant
/// module callbacks observe consistent rules.
#[derive(Default)]
pub struct AccountCore {
    accounts: HashMap<Address, AccountRecord>,
}

impl AccountCore {
    /// An empty core with no registered accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account record with an embedded signer set.
    pub fn register_account(&mut self, account: Address, signer_set: SignerSet) {
        self.accounts.insert(account, AccountRecord { signer_set, ..Default::default() });
    }

    /// Whether an account record exists at `account`.
    pub fn is_registered(&self, account: Address) -> bool {
        self.accounts.contains_key(&account)
    }

    /// The account's embedded signer set.
    pub fn signer_set(&self, account: Address) -> Result<&SignerSet, AccountError> {
        Ok(&self.record(account)?.signer_set)
    }

    /// Mutable access to the embedded signer set. Only the account itself
    /// may reconfigure its signers.
    pub fn signer_set_mut(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<&mut SignerSet, AccountError> {
        if caller != account {
            return Err(AccountError::Unauthorized(caller));
        }
        Ok(&mut self.record_mut(account)?.signer_set)
    }

    /// The next expected sequence for a nonce key.
    pub fn nonce(&self, account: Address, key: U256) -> u64 {
        self.accounts
            .get(&account)
            .and_then(|record| record.nonces.get(&key))
            .copied()
            .unwrap_or_default()
    }

    /// Whether the type id names one of the four known roles.
    pub fn supports_module(&self, type_id: u32) -> bool {
        ModuleType::from_id(type_id).is_some()
    }

    /// Whether the mode descriptor names a known call and exec type.
    pub fn supports_execution_mode(&self, mode: ExecutionMode) -> bool {
        mode.is_supported()
    }

    /// Whether `module` is installed on `account` in the given role. For
    /// fallback modules, `additional_context` carries the selector.
    pub fn is_module_installed(
        &self,
        account: Address,
        type_id: u32,
        module: Address,
        additional_context: &[u8],
    ) -> bool {
        let Some(record) = self.accounts.get(&account) else {
            return false;
        };
        match ModuleType::from_id(type_id) {
            Some(ModuleType::Validator) => record.validators.contains(&module),
            Some(ModuleType::Executor) => record.executors.contains(&module),
            Some(ModuleType::Fallback) => {
                additional_context.len() >= 4
                    && record.fallbacks.get(&FixedBytes::from_slice(&additional_context[..4]))
                        == Some(&module)
            }
            Some(ModuleType::Hook) => record.hook == Some(module),
            None => false,
        }
    }

    /// Installs `module` on `account` in the role named by `type_id`.
    ///
    /// The module is recorded before its `on_install` callback runs, so a
    /// re-entrant callback already observes it as installed. For fallback
    /// modules, the first four bytes of `init_data` are the selector and
    /// are stripped before the callback.
    pub fn install_module(
        &mut self,
        env: &mut Environment,
        caller: Address,
        account: Address,
        type_id: u32,
        module: Address,
        init_data: &[u8],
    ) -> Result<(), AccountError> {
        self.authorize_account_or_coordinator(env, caller, account)?;
        // The hook active at entry brackets the install; a hook being
        // installed right now does not wrap itself.
        let hook = self.record(account)?.hook;
        let hook_ctx = hook_pre(env, hook, account, caller, U256::ZERO, init_data)?;

        let module_type =
            ModuleType::from_id(type_id).ok_or(AccountError::UnsupportedModuleType(type_id))?;
        let contract = env.module(module).ok_or(AccountError::UnknownModule(module))?;
        if !contract.is_module_type(module_type) {
            return Err(AccountError::ModuleTypeMismatch(module_type, module));
        }

        let record = self.record_mut(account)?;
        let callback_data: Vec<u8> = match module_type {
            ModuleType::Validator => {
                if !record.validators.insert(module) {
                    return Err(AccountError::AlreadyInstalled(module_type, module));
                }
                init_data.to_vec()
            }
            ModuleType::Executor => {
                if !record.executors.insert(module) {
                    return Err(AccountError::AlreadyInstalled(module_type, module));
                }
                init_data.to_vec()
            }
            ModuleType::Fallback => {
                let selector = fallback_selector(init_data)?;
                if record.fallbacks.contains_key(&selector) {
                    return Err(AccountError::AlreadyInstalled(module_type, module));
                }
                record.fallbacks.insert(selector, module);
                init_data[4..].to_vec()
            }
            ModuleType::Hook => {
                if let Some(current) = record.hook {
                    return Err(AccountError::HookAlreadyInstalled(current));
                }
                record.hook = Some(module);
                init_data.to_vec()
            }
        };

        if let Err(revert) = self.invoke_lifecycle(env, module, account, &callback_data, true) {
            self.erase_role(account, module_type, module, init_data);
            return Err(AccountError::ModuleCallbackFailed(revert));
        }

        hook_post(env, hook, account, hook_ctx)?;
        env.emit(AccountEvent::ModuleInstalled { account, module_type, module });
        Ok(())
    }

    /// Uninstalls `module` from `account`.
    ///
    /// Mirrors [`AccountCore::install_module`]: the record is erased before
    /// `on_uninstall` runs. Uninstalling the active hook is still bracketed
    /// by that hook, since the hook is resolved at entry.
    pub fn uninstall_module(
        &mut self,
        env: &mut Environment,
        caller: Address,
        account: Address,
        type_id: u32,
        module: Address,
        deinit_data: &[u8],
    ) -> Result<(), AccountError> {
        self.authorize_account_or_coordinator(env, caller, account)?;
        let hook = self.record(account)?.hook;
        let hook_ctx = hook_pre(env, hook, account, caller, U256::ZERO, deinit_data)?;

        let module_type =
            ModuleType::from_id(type_id).ok_or(AccountError::UnsupportedModuleType(type_id))?;
        if !env.module_exists(module) {
            return Err(AccountError::UnknownModule(module));
        }

        let record = self.record_mut(account)?;
        let callback_data: Vec<u8> = match module_type {
            ModuleType::Validator => {
                if !record.validators.remove(&module) {
                    return Err(AccountError::NotInstalled(module_type, module));
                }
                deinit_data.to_vec()
            }
            ModuleType::Executor => {
                if !record.executors.remove(&module) {
                    return Err(AccountError::NotInstalled(module_type, module));
                }
                deinit_data.to_vec()
            }
            ModuleType::Fallback => {
                let selector = fallback_selector(deinit_data)?;
                if record.fallbacks.get(&selector) != Some(&module) {
                    return Err(AccountError::NotInstalled(module_type, module));
                }
                record.fallbacks.remove(&selector);
                deinit_data[4..].to_vec()
            }
            ModuleType::Hook => {
                if record.hook != Some(module) {
                    return Err(AccountError::NotInstalled(module_type, module));
                }
                record.hook = None;
                deinit_data.to_vec()
            }
        };

        if let Err(revert) = self.invoke_lifecycle(env, module, account, &callback_data, false) {
            self.restore_role(account, module_type, module, deinit_data);
            return Err(AccountError::ModuleCallbackFailed(revert));
        }

        hook_post(env, hook, account, hook_ctx)?;
        env.emit(AccountEvent::ModuleUninstalled { account, module_type, module });
        Ok(())
    }

    /// Dispatches an execution on behalf of the account. Callable by the
    /// coordinator or the account itself.
    pub fn execute(
        &mut self,
        env: &mut Environment,
        caller: Address,
        account: Address,
        mode: ExecutionMode,
        data: &[u8],
    ) -> Result<Vec<Bytes>, AccountError> {
        self.authorize_account_or_coordinator(env, caller, account)?;
        let hook = self.record(account)?.hook;
        let hook_ctx = hook_pre(env, hook, account, caller, U256::ZERO, data)?;
        let results = dispatch(env, account, mode, data)?;
        hook_post(env, hook, account, hook_ctx)?;
        Ok(results)
    }

    /// Dispatches an execution driven by an installed executor module.
    pub fn execute_from_executor(
        &mut self,
        env: &mut Environment,
        caller: Address,
        account: Address,
        mode: ExecutionMode,
        data: &[u8],
    ) -> Result<Vec<Bytes>, AccountError> {
        let record = self.record(account)?;
        if !record.executors.contains(&caller) {
            return Err(AccountError::NotInstalled(ModuleType::Executor, caller));
        }
        let hook = record.hook;
        let hook_ctx = hook_pre(env, hook, account, caller, U256::ZERO, data)?;
        let results = dispatch(env, account, mode, data)?;
        hook_post(env, hook, account, hook_ctx)?;
        Ok(results)
    }

    /// Routes a call with an unmatched selector to the account's fallback
    /// module for that selector, bubbling its revert payload unmodified.
    /// A reverting handler refunds the value it carried, mirroring
    /// [`Environment::call`].
    pub fn handle_fallback(
        &mut self,
        env: &mut Environment,
        caller: Address,
        account: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, AccountError> {
        let record = self.record(account)?;
        let mut selector = [0u8; 4];
        let head = data.len().min(4);
        selector[..head].copy_from_slice(&data[..head]);
        let selector = FixedBytes::from(selector);
        let Some(&module) = record.fallbacks.get(&selector) else {
            return Err(AccountError::MissingFallbackHandler(selector));
        };
        let hook = record.hook;
        let hook_ctx = hook_pre(env, hook, account, caller, value, data)?;

        env.transfer(caller, account, value)
            .map_err(|err| AccountError::ExecutionFailed(revert_payload(&err)))?;

        let mut contract =
            env.take_module(module).ok_or(AccountError::UnknownModule(module))?;
        let result = match contract.as_fallback() {
            Some(handler) => handler.handle(env, account, caller, value, data),
            None => Err(Bytes::from_static(b"module lacks fallback capability")),
        };
        env.put_module(module, contract);
        let returned = match result {
            Ok(returned) => returned,
            Err(revert) => {
                if !value.is_zero() {
                    // Refund cannot fail: the account holds at least `value`.
                    let _ = env.transfer(account, caller, value);
                }
                return Err(AccountError::ExecutionFailed(revert));
            }
        };

        hook_post(env, hook, account, hook_ctx)?;
        Ok(returned)
    }

    /// Validates an operation on behalf of the coordinator.
    ///
    /// The nonce counter is consumed up front: it advances even when the
    /// signature turns out invalid, so a failed operation cannot be
    /// replayed. The validator module is resolved from the leading 20
    /// bytes of the nonce key; absent one, the embedded signer set decides.
    /// Signature failures are the soft failure sentinel, never an error.
    /// The prefund, when requested, is paid best-effort regardless of the
    /// validation outcome.
    pub fn validate_operation(
        &mut self,
        env: &mut Environment,
        caller: Address,
        op: &PackedOperation,
        op_hash: B256,
        missing_funds: U256,
    ) -> Result<ValidationData, AccountError> {
        let coordinator = env.coordinator();
        if caller != coordinator {
            return Err(AccountError::Unauthorized(caller));
        }
        let account = op.sender;
        let record = self.record_mut(account)?;

        let counter = record.nonces.entry(op.nonce_key()).or_insert(0);
        let expected = *counter;
        let got = op.nonce_sequence();
        if got != expected {
            return Err(AccountError::InvalidNonce { expected, got });
        }
        *counter += 1;

        let validator = op.nonce_validator();
        let use_module =
            validator != Address::ZERO && record.validators.contains(&validator);

        let validation = if use_module {
            let mut contract =
                env.take_module(validator).ok_or(AccountError::UnknownModule(validator))?;
            let packed = match contract.as_validator() {
                Some(v) => v.validate_operation(env, account, op, op_hash),
                None => SIG_VALIDATION_FAILED,
            };
            env.put_module(validator, contract);
            ValidationData::unpack(packed)
        } else {
            let record = self.record(account)?;
            let accepted = match <(Vec<Bytes>, Vec<Bytes>)>::abi_decode_params(&op.signature) {
                Ok((raw_signers, signatures)) => {
                    let signers: Vec<SignerId> =
                        raw_signers.into_iter().map(SignerId).collect();
                    record.signer_set.validate(&*env, op_hash, &signers, &signatures)
                }
                Err(err) => {
                    debug!(%err, %account, "malformed embedded multisig payload");
                    false
                }
            };
            ValidationData::unpack(if accepted {
                SIG_VALIDATION_SUCCESS
            } else {
                SIG_VALIDATION_FAILED
            })
        };

        if !missing_funds.is_zero() {
            if let Err(err) = env.transfer(account, coordinator, missing_funds) {
                debug!(%err, %account, "prefund payment failed");
            }
        }
        Ok(validation)
    }

    /// The canonical hash an operation is signed over in this environment.
    pub fn operation_hash(&self, env: &Environment, op: &PackedOperation) -> B256 {
        hash_operation(op, env.coordinator(), env.chain_id())
    }

    fn record(&self, account: Address) -> Result<&AccountRecord, AccountError> {
        self.accounts.get(&account).ok_or(AccountError::UnknownAccount(account))
    }

    fn record_mut(&mut self, account: Address) -> Result<&mut AccountRecord, AccountError> {
        self.accounts.get_mut(&account).ok_or(AccountError::UnknownAccount(account))
    }

    fn authorize_account_or_coordinator(
        &self,
        env: &Environment,
        caller: Address,
        account: Address,
    ) -> Result<(), AccountError> {
        if caller != account && caller != env.coordinator() {
            return Err(AccountError::Unauthorized(caller));
        }
        Ok(())
    }

    fn invoke_lifecycle(
        &mut self,
        env: &mut Environment,
        module: Address,
        account: Address,
        data: &[u8],
        install: bool,
    ) -> Result<(), Bytes> {
        let Some(mut contract) = env.take_module(module) else {
            return Err(Bytes::from_static(b"module vanished"));
        };
        let result = if install {
            contract.on_install(env, account, data)
        } else {
            contract.on_uninstall(env, account, data)
        };
        env.put_module(module, contract);
        result
    }

    // Rolls back a role recording after a failed on_install.
    fn erase_role(&mut self, account: Address, module_type: ModuleType, module: Address, data: &[u8]) {
        let Some(record) = self.accounts.get_mut(&account) else { return };
        match module_type {
            ModuleType::Validator => {
                record.validators.remove(&module);
            }
            ModuleType::Executor => {
                record.executors.remove(&module);
            }
            ModuleType::Fallback => {
                if let Ok(selector) = fallback_selector(data) {
                    record.fallbacks.remove(&selector);
                }
            }
            ModuleType::Hook => record.hook = None,
        }
    }

    // Reinstates a role recording after a failed on_uninstall.
    fn restore_role(&mut self, account: Address, module_type: ModuleType, module: Address, data: &[u8]) {
        let Some(record) = self.accounts.get_mut(&account) else { return };
        match module_type {
            ModuleType::Validator => {
                record.validators.insert(module);
            }
            ModuleType::Executor => {
                record.executors.insert(module);
            }
            ModuleType::Fallback => {
                if let Ok(selector) = fallback_selector(data) {
                    record.fallbacks.insert(selector, module);
                }
            }
            ModuleType::Hook => record.hook = Some(module),
        }
    }
}

fn fallback_selector(data: &[u8]) -> Result<FixedBytes<4>, AccountError> {
    if data.len() < 4 {
        return Err(AccountError::InvalidModuleData);
    }
    Ok(FixedBytes::from_slice(&data[..4]))
}

fn revert_payload(err: &dyn std::fmt::Display) -> Bytes {
    Bytes::from(err.to_string().into_bytes())
}

fn hook_pre(
    env: &mut Environment,
    hook: Option<Address>,
    account: Address,
    caller: Address,
    value: U256,
    data: &[u8],
) -> Result<Option<(Address, Bytes)>, AccountError> {
    let Some(hook) = hook else {
        return Ok(None);
    };
    let mut contract = env.take_module(hook).ok_or(AccountError::UnknownModule(hook))?;
    let result = match contract.as_hook() {
        Some(h) => h.pre_check(env, account, caller, value, data),
        None => Err(Bytes::from_static(b"module lacks hook capability")),
    };
    env.put_module(hook, contract);
    let context = result.map_err(AccountError::ModuleCallbackFailed)?;
    Ok(Some((hook, context)))
}

fn hook_post(
    env: &mut Environment,
    hook: Option<Address>,
    account: Address,
    context: Option<(Address, Bytes)>,
) -> Result<(), AccountError> {
    debug_assert_eq!(hook.is_some(), context.is_some());
    let Some((hook, context)) = context else {
        return Ok(());
    };
    let mut contract = env.take_module(hook).ok_or(AccountError::UnknownModule(hook))?;
    let result = match contract.as_hook() {
        Some(h) => h.post_check(env, account, &context),
        None => Err(Bytes::from_static(b"module lacks hook capability")),
    };
    env.put_module(hook, contract);
    result.map_err(AccountError::ModuleCallbackFailed)
}

fn dispatch(
    env: &mut Environment,
    account: Address,
    mode: ExecutionMode,
    data: &[u8],
) -> Result<Vec<Bytes>, AccountError> {
    let call_type =
        mode.call_type().ok_or(AccountError::UnsupportedCallType(mode.call_type_byte()))?;
    let exec_type =
        mode.exec_type().ok_or(AccountError::UnsupportedExecType(mode.exec_type_byte()))?;
    match exec_type {
        // Abort semantics: no side effect of any sub-call survives a failure.
        ExecType::Default => {
            let snapshot = env.snapshot();
            run_calls(env, account, call_type, exec_type, data).inspect_err(|_| {
                env.restore(snapshot);
            })
        }
        ExecType::Try => run_calls(env, account, call_type, exec_type, data),
    }
}

fn run_calls(
    env: &mut Environment,
    account: Address,
    call_type: CallType,
    exec_type: ExecType,
    data: &[u8],
) -> Result<Vec<Bytes>, AccountError> {
    match call_type {
        CallType::Call => {
            let execution = decode_single(data).map_err(decode_error)?;
            let outcome = env.call(account, execution.target, execution.value, &execution.data);
            Ok(vec![settle(env, account, CallType::Call, exec_type, outcome)?])
        }
        CallType::Batch => {
            let executions = decode_batch(data).map_err(decode_error)?;
            let mut results = Vec::with_capacity(executions.len());
            for execution in &executions {
                let outcome =
                    env.call(account, execution.target, execution.value, &execution.data);
                results.push(settle(env, account, CallType::Batch, exec_type, outcome)?);
            }
            Ok(results)
        }
        CallType::Delegate => {
            let (target, calldata) = decode_delegate(data).map_err(decode_error)?;
            let outcome = env.delegate_call(account, target, &calldata);
            // Delegated failures are reported as plain calls.
            Ok(vec![settle(env, account, CallType::Call, exec_type, outcome)?])
        }
    }
}

fn settle(
    env: &mut Environment,
    account: Address,
    reported: CallType,
    exec_type: ExecType,
    outcome: Result<Bytes, Bytes>,
) -> Result<Bytes, AccountError> {
    match outcome {
        Ok(returned) => Ok(returned),
        Err(revert) => match exec_type {
            ExecType::Default => Err(AccountError::ExecutionFailed(revert)),
            ExecType::Try => {
                warn!(%account, call_type = ?reported, "sub-call failed, continuing");
                env.emit(AccountEvent::TryExecuteFail { account, call_type: reported, revert });
                Ok(Bytes::new())
            }
        },
    }
}

fn decode_error(err: ExecutionDecodeError) -> AccountError {
    AccountError::ExecutionFailed(revert_payload(&err))
}
