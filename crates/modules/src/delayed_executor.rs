//! An executor module that time-locks operations behind a per-account
//! delay and expiration window.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolValue;
use msa_account::{AccountCore, AccountError, Environment, ModuleContract};
use msa_primitives::{ExecutionMode, ModuleType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Delay applied when install data carries no configuration: 5 days.
pub const DEFAULT_DELAY: u32 = 5 * 86_400;

/// Expiration applied when install data carries no configuration: 60 days.
pub const DEFAULT_EXPIRATION: u32 = 60 * 86_400;

/// Observable lifecycle of a scheduled operation.
///
/// `Scheduled -> Ready` and `Ready -> Expired` are pure clock comparisons,
/// derived from the stored timestamps rather than stored themselves.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationState {
    /// Never scheduled (or rescheduled after a terminal state).
    Unknown,
    /// Scheduled, delay still running.
    Scheduled,
    /// Delay passed, not yet expired.
    Ready,
    /// Executed through the account.
    Executed,
    /// The execution window closed without execution.
    Expired,
    /// Canceled by the account.
    Canceled,
}

/// Errors from the delayed executor's entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The module is not installed on the account.
    #[error("executor module not installed on account {0}")]
    ModuleNotInstalled(Address),
    /// Only the account may schedule or cancel its own operations.
    #[error("unauthorized caller {0}")]
    Unauthorized(Address),
    /// The operation is not in a state that permits the transition.
    #[error("operation {id} is {current:?}")]
    UnexpectedOperationState {
        /// The operation id.
        id: B256,
        /// Its current derived state.
        current: OperationState,
    },
    /// Install data is neither empty nor a `(uint32, uint32)` pair.
    #[error("malformed executor configuration")]
    InvalidConfigFormat,
    /// The dispatched execution failed in the account core.
    #[error(transparent)]
    Account(#[from] AccountError),
}

/// Events recorded by the executor. Tests inspect these through
/// [`DelayedExecutor::events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    /// The account's delay changed (or will, at `effect_at`).
    DelayUpdated { account: Address, delay: u32, effect_at: u64 },
    /// The account's expiration changed, effective immediately.
    ExpirationUpdated { account: Address, expiration: u32 },
    /// An operation was scheduled.
    OperationScheduled {
        account: Address,
        id: B256,
        salt: B256,
        mode: ExecutionMode,
        data: Bytes,
        ready_at: u64,
    },
    /// An operation was executed.
    OperationExecuted { account: Address, id: B256 },
    /// An operation was canceled.
    OperationCanceled { account: Address, id: B256 },
}

#[derive(Debug, Clone, Copy)]
struct PendingDelay {
    delay: u32,
    effect_at: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Config {
    delay: u32,
    expiration: u32,
    pending: Option<PendingDelay>,
    allow_early_execution: bool,
}

impl Config {
    // Resolves the delay as of `now`, collapsing a pending change whose
    // effect time has passed.
    fn resolved(mut self, now: u64) -> Self {
        if let Some(pending) = self.pending {
            if now >= pending.effect_at {
                self.delay = pending.delay;
                self.pending = None;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    scheduled_at: u64,
    ready_at: u64,
    expires_at: u64,
    executed: bool,
    canceled: bool,
}

impl Schedule {
    fn state(&self, now: u64) -> OperationState {
        if self.executed {
            OperationState::Executed
        } else if self.canceled {
            OperationState::Canceled
        } else if now < self.ready_at {
            OperationState::Scheduled
        } else if now < self.expires_at {
            OperationState::Ready
        } else {
            OperationState::Expired
        }
    }
}

#[derive(Default)]
struct ExecutorState {
    configs: HashMap<Address, Config>,
    schedules: HashMap<B256, Schedule>,
    events: Vec<ExecutorEvent>,
}

/// A time-locking executor module.
///
/// The account schedules an operation; once its delay has run, anyone may
/// execute it until it expires; the account may cancel it while pending.
/// Reducing the delay never shortens the protection of operations already
/// scheduled: the new delay takes effect only once the old delay would
/// have elapsed. Cloning shares state; keep a clone as the driving handle
/// after registering the module.
#[derive(Clone)]
pub struct DelayedExecutor {
    address: Address,
    state: Arc<Mutex<ExecutorState>>,
}

impl DelayedExecutor {
    /// An executor deployed at `address`.
    pub fn new(address: Address) -> Self {
        Self { address, state: Arc::new(Mutex::new(ExecutorState::default())) }
    }

    /// The address this module is deployed at.
    pub fn address(&self) -> Address {
        self.address
    }

    /// ABI-encodes install data for the given delay and expiration.
    pub fn encode_install_data(delay: u32, expiration: u32) -> Bytes {
        (delay, expiration).abi_encode_params().into()
    }

    /// The id an operation is tracked under.
    pub fn hash_operation_id(
        account: Address,
        salt: B256,
        mode: ExecutionMode,
        data: &[u8],
    ) -> B256 {
        let encoded =
            (account, salt, mode.0, Bytes::copy_from_slice(data)).abi_encode_params();
        keccak256(encoded)
    }

    /// Events recorded so far, in order.
    pub fn events(&self) -> Vec<ExecutorEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// `(current delay, pending delay, effect time)` for the account. The
    /// pending pair is zero once the change has taken effect.
    pub fn get_delay(&self, env: &Environment, account: Address) -> (u32, u32, u64) {
        let state = self.state.lock().unwrap();
        let Some(config) = state.configs.get(&account) else {
            return (0, 0, 0);
        };
        let resolved = config.resolved(env.timestamp());
        match resolved.pending {
            Some(pending) => (resolved.delay, pending.delay, pending.effect_at),
            None => (resolved.delay, 0, 0),
        }
    }

    /// The account's current expiration window.
    pub fn get_expiration(&self, account: Address) -> u32 {
        self.state
            .lock()
            .unwrap()
            .configs
            .get(&account)
            .map(|config| config.expiration)
            .unwrap_or_default()
    }

    /// Schedules a delay change for the caller's account.
    ///
    /// The change takes effect at `now + old_delay - new_delay`
    /// (saturating), so pending operations keep their original protection.
    pub fn set_delay(
        &self,
        env: &Environment,
        caller: Address,
        new_delay: u32,
    ) -> Result<(), ExecutorError> {
        let now = env.timestamp();
        let mut state = self.state.lock().unwrap();
        let config =
            state.configs.get_mut(&caller).ok_or(ExecutorError::ModuleNotInstalled(caller))?;
        *config = config.resolved(now);
        let effect_at = now + u64::from(config.delay.saturating_sub(new_delay));
        config.pending = Some(PendingDelay { delay: new_delay, effect_at });
        state.events.push(ExecutorEvent::DelayUpdated {
            account: caller,
            delay: new_delay,
            effect_at,
        });
        Ok(())
    }

    /// Updates the caller's expiration window, effective immediately.
    pub fn set_expiration(
        &self,
        _env: &Environment,
        caller: Address,
        new_expiration: u32,
    ) -> Result<(), ExecutorError> {
        let mut state = self.state.lock().unwrap();
        let config =
            state.configs.get_mut(&caller).ok_or(ExecutorError::ModuleNotInstalled(caller))?;
        config.expiration = new_expiration;
        state.events.push(ExecutorEvent::ExpirationUpdated {
            account: caller,
            expiration: new_expiration,
        });
        Ok(())
    }

    /// Lets the account itself execute its operations while still in the
    /// `Scheduled` state. Off by default.
    pub fn set_allow_early_execution(
        &self,
        caller: Address,
        allow: bool,
    ) -> Result<(), ExecutorError> {
        let mut state = self.state.lock().unwrap();
        let config =
            state.configs.get_mut(&caller).ok_or(ExecutorError::ModuleNotInstalled(caller))?;
        config.allow_early_execution = allow;
        Ok(())
    }

    /// Schedules an operation for the account. Account only; the module
    /// must be installed; the operation must not already be pending.
    pub fn schedule(
        &self,
        core: &AccountCore,
        env: &Environment,
        caller: Address,
        account: Address,
        salt: B256,
        mode: ExecutionMode,
        data: &[u8],
    ) -> Result<B256, ExecutorError> {
        if !core.is_module_installed(account, ModuleType::Executor.id(), self.address, &[]) {
            return Err(ExecutorError::ModuleNotInstalled(account));
        }
        if caller != account {
            return Err(ExecutorError::Unauthorized(caller));
        }
        let now = env.timestamp();
        let id = Self::hash_operation_id(account, salt, mode, data);

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.schedules.get(&id) {
            let current = existing.state(now);
            if matches!(current, OperationState::Scheduled | OperationState::Ready) {
                return Err(ExecutorError::UnexpectedOperationState { id, current });
            }
        }
        let config = state.configs.get(&account).copied().unwrap_or_default().resolved(now);
        let ready_at = now + u64::from(config.delay);
        let expires_at = ready_at + u64::from(config.expiration);
        state.schedules.insert(
            id,
            Schedule { scheduled_at: now, ready_at, expires_at, executed: false, canceled: false },
        );
        state.events.push(ExecutorEvent::OperationScheduled {
            account,
            id,
            salt,
            mode,
            data: Bytes::copy_from_slice(data),
            ready_at,
        });
        debug!(%account, %id, ready_at, expires_at, "operation scheduled");
        Ok(id)
    }

    /// `(scheduled_at, ready_at, expires_at)` for an operation, if known.
    pub fn get_schedule(
        &self,
        account: Address,
        salt: B256,
        mode: ExecutionMode,
        data: &[u8],
    ) -> Option<(u64, u64, u64)> {
        let id = Self::hash_operation_id(account, salt, mode, data);
        self.state
            .lock()
            .unwrap()
            .schedules
            .get(&id)
            .map(|schedule| (schedule.scheduled_at, schedule.ready_at, schedule.expires_at))
    }

    /// The derived state of an operation.
    pub fn state(
        &self,
        env: &Environment,
        account: Address,
        salt: B256,
        mode: ExecutionMode,
        data: &[u8],
    ) -> OperationState {
        let id = Self::hash_operation_id(account, salt, mode, data);
        self.state
            .lock()
            .unwrap()
            .schedules
            .get(&id)
            .map(|schedule| schedule.state(env.timestamp()))
            .unwrap_or(OperationState::Unknown)
    }

    /// Executes a ready operation through the account's executor path.
    ///
    /// Callable by anyone; the ready-time gate applies to the owning
    /// account as well unless it opted into early execution.
    pub fn execute(
        &self,
        core: &mut AccountCore,
        env: &mut Environment,
        caller: Address,
        account: Address,
        salt: B256,
        mode: ExecutionMode,
        data: &[u8],
    ) -> Result<Vec<Bytes>, ExecutorError> {
        let now = env.timestamp();
        let id = Self::hash_operation_id(account, salt, mode, data);
        {
            let mut state = self.state.lock().unwrap();
            let early_allowed = caller == account
                && state.configs.get(&account).is_some_and(|c| c.allow_early_execution);
            let Some(schedule) = state.schedules.get_mut(&id) else {
                return Err(ExecutorError::UnexpectedOperationState {
                    id,
                    current: OperationState::Unknown,
                });
            };
            let current = schedule.state(now);
            let executable = current == OperationState::Ready
                || (current == OperationState::Scheduled && early_allowed);
            if !executable {
                return Err(ExecutorError::UnexpectedOperationState { id, current });
            }
            schedule.executed = true;
        }

        // The lock is released before dispatch: the account core may call
        // back into this module.
        match core.execute_from_executor(env, self.address, account, mode, data) {
            Ok(results) => {
                let mut state = self.state.lock().unwrap();
                state.events.push(ExecutorEvent::OperationExecuted { account, id });
                Ok(results)
            }
            Err(err) => {
                if let Some(schedule) = self.state.lock().unwrap().schedules.get_mut(&id) {
                    schedule.executed = false;
                }
                Err(err.into())
            }
        }
    }

    /// Cancels a pending operation. Account only, from `Scheduled` or
    /// `Ready`.
    pub fn cancel(
        &self,
        env: &Environment,
        caller: Address,
        account: Address,
        salt: B256,
        mode: ExecutionMode,
        data: &[u8],
    ) -> Result<(), ExecutorError> {
        if caller != account {
            return Err(ExecutorError::Unauthorized(caller));
        }
        let now = env.timestamp();
        let id = Self::hash_operation_id(account, salt, mode, data);
        let mut state = self.state.lock().unwrap();
        let Some(schedule) = state.schedules.get_mut(&id) else {
            return Err(ExecutorError::UnexpectedOperationState {
                id,
                current: OperationState::Unknown,
            });
        };
        let current = schedule.state(now);
        if !matches!(current, OperationState::Scheduled | OperationState::Ready) {
            return Err(ExecutorError::UnexpectedOperationState { id, current });
        }
        schedule.canceled = true;
        state.events.push(ExecutorEvent::OperationCanceled { account, id });
        Ok(())
    }
}

impl ModuleContract for DelayedExecutor {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Executor
    }

    /// Decodes `(uint32 delay, uint32 expiration)` install data; empty data
    /// selects the defaults. Reinstalling over a surviving configuration is
    /// a no-op.
    fn on_install(
        &mut self,
        env: &mut Environment,
        account: Address,
        data: &[u8],
    ) -> Result<(), Bytes> {
        let now = env.timestamp();
        let mut state = self.state.lock().unwrap();
        if state.configs.contains_key(&account) {
            return Ok(());
        }
        let (delay, expiration) = if data.is_empty() {
            (DEFAULT_DELAY, DEFAULT_EXPIRATION)
        } else {
            <(u32, u32)>::abi_decode_params(data).map_err(|_| {
                Bytes::from(ExecutorError::InvalidConfigFormat.to_string().into_bytes())
            })?
        };
        state.configs.insert(
            account,
            Config { delay, expiration, pending: None, allow_early_execution: false },
        );
        state.events.push(ExecutorEvent::DelayUpdated { account, delay, effect_at: now });
        state.events.push(ExecutorEvent::ExpirationUpdated { account, expiration });
        Ok(())
    }

    /// Schedules the delay down to zero at `now + current_delay` and drops
    /// the expiration immediately, so uninstalling cannot bypass the
    /// protection of operations already scheduled.
    fn on_uninstall(
        &mut self,
        env: &mut Environment,
        account: Address,
        _data: &[u8],
    ) -> Result<(), Bytes> {
        let now = env.timestamp();
        let mut state = self.state.lock().unwrap();
        let Some(config) = state.configs.get_mut(&account) else {
            return Ok(());
        };
        *config = config.resolved(now);
        let effect_at = now + u64::from(config.delay);
        config.pending = Some(PendingDelay { delay: 0, effect_at });
        config.expiration = 0;
        state.events.push(ExecutorEvent::DelayUpdated { account, delay: 0, effect_at });
        state.events.push(ExecutorEvent::ExpirationUpdated { account, expiration: 0 });
        Ok(())
    }
}
