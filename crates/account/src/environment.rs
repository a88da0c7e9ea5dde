//! The in-process stand-in for the ledger and contract surroundings.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use msa_signatures::{ContractWallet, SignatureVerifier, VerifierRegistry};
use tracing::debug;

use crate::{
    events::AccountEvent,
    interface::{CallScope, ContractCode, ModuleContract},
};

/// A native-value transfer that exceeds the sender's balance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insufficient balance: {from} holds {balance}, transfer needs {amount}")]
pub struct InsufficientBalance {
    /// The sender.
    pub from: Address,
    /// The sender's balance at transfer time.
    pub balance: U256,
    /// The amount requested.
    pub amount: U256,
}

/// Everything the account core reaches outside its own records: balances,
/// per-address storage namespaces, deployed contract code, module
/// instances, signature verifiers and contract wallets, a manual clock,
/// and an event sink.
///
/// State-changing sub-calls are atomic: a reverting call refunds any value
/// it carried. Broader rollback (abort-on-first execution) is handled with
/// [`Environment::snapshot`] / [`Environment::restore`].
pub struct Environment {
    coordinator: Address,
    chain_id: u64,
    timestamp: u64,
    balances: HashMap<Address, U256>,
    storage: HashMap<Address, HashMap<B256, B256>>,
    contracts: HashMap<Address, Box<dyn ContractCode>>,
    modules: HashMap<Address, Box<dyn ModuleContract>>,
    verifiers: HashMap<Address, Box<dyn SignatureVerifier + Send>>,
    wallets: HashMap<Address, Box<dyn ContractWallet + Send>>,
    events: Vec<AccountEvent>,
}

/// A restorable copy of the environment's ledger state.
pub struct Snapshot {
    balances: HashMap<Address, U256>,
    storage: HashMap<Address, HashMap<B256, B256>>,
    events_len: usize,
}

impl Environment {
    /// An empty environment with the given trusted coordinator.
    pub fn new(coordinator: Address, chain_id: u64) -> Self {
        Self {
            coordinator,
            chain_id,
            timestamp: 0,
            balances: HashMap::new(),
            storage: HashMap::new(),
            contracts: HashMap::new(),
            modules: HashMap::new(),
            verifiers: HashMap::new(),
            wallets: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// The trusted coordinator address.
    pub fn coordinator(&self) -> Address {
        self.coordinator
    }

    /// The chain id operations are bound to.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Current clock reading.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Sets the clock. Time only moves forward.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        debug_assert!(timestamp >= self.timestamp);
        self.timestamp = timestamp;
    }

    /// Advances the clock by `seconds`.
    pub fn advance_time(&mut self, seconds: u64) {
        self.timestamp += seconds;
    }

    /// The native balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    /// Sets the native balance of `address`.
    pub fn set_balance(&mut self, address: Address, amount: U256) {
        self.balances.insert(address, amount);
    }

    /// Moves native value between addresses, atomically.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), InsufficientBalance> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.balance(from);
        if balance < amount {
            return Err(InsufficientBalance { from, balance, amount });
        }
        *self.balances.entry(from).or_default() -= amount;
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    /// Deploys contract code at `address`.
    pub fn register_contract(&mut self, address: Address, code: Box<dyn ContractCode>) {
        self.contracts.insert(address, code);
    }

    /// Deploys a module contract at `address`.
    pub fn register_module(&mut self, address: Address, module: Box<dyn ModuleContract>) {
        self.modules.insert(address, module);
    }

    /// Registers an external signature verifier at `address`.
    pub fn register_verifier(
        &mut self,
        address: Address,
        verifier: Box<dyn SignatureVerifier + Send>,
    ) {
        self.verifiers.insert(address, verifier);
    }

    /// Registers a contract wallet at `address`.
    pub fn register_wallet(&mut self, address: Address, wallet: Box<dyn ContractWallet + Send>) {
        self.wallets.insert(address, wallet);
    }

    /// Whether a module contract is deployed at `address`.
    pub fn module_exists(&self, address: Address) -> bool {
        self.modules.contains_key(&address)
    }

    /// Read-only access to the module deployed at `address`.
    pub fn module(&self, address: Address) -> Option<&dyn ModuleContract> {
        self.modules.get(&address).map(|m| m.as_ref() as &dyn ModuleContract)
    }

    /// Removes a module instance for the duration of an invocation. The
    /// caller must reinsert it with [`Environment::put_module`].
    pub fn take_module(&mut self, address: Address) -> Option<Box<dyn ModuleContract>> {
        self.modules.remove(&address)
    }

    /// Reinserts a module instance taken with [`Environment::take_module`].
    pub fn put_module(&mut self, address: Address, module: Box<dyn ModuleContract>) {
        self.modules.insert(address, module);
    }

    /// Calls the contract at `target`, transferring `value` first.
    ///
    /// A target without code accepts plain transfers. A reverting call
    /// refunds the transferred value; the revert payload is returned
    /// unmodified as `Err`.
    pub fn call(
        &mut self,
        caller: Address,
        target: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Bytes> {
        self.transfer(caller, target, value)
            .map_err(|err| Bytes::from(err.to_string().into_bytes()))?;
        let Some(code) = self.contracts.get(&target) else {
            return Ok(Bytes::new());
        };
        let mut scope = CallScope {
            code_address: target,
            this: target,
            caller,
            value,
            timestamp: self.timestamp,
            storage: self.storage.entry(target).or_default(),
        };
        let result = code.call(&mut scope, data);
        if result.is_err() && !value.is_zero() {
            // Refund cannot fail: the target holds at least `value`.
            let _ = self.transfer(target, caller, value);
        }
        result
    }

    /// Runs the code at `target` against the storage namespace of
    /// `account`. Delegated calls carry no value; a target without code is
    /// a successful no-op.
    pub fn delegate_call(
        &mut self,
        account: Address,
        target: Address,
        data: &[u8],
    ) -> Result<Bytes, Bytes> {
        let Some(code) = self.contracts.get(&target) else {
            return Ok(Bytes::new());
        };
        let mut scope = CallScope {
            code_address: target,
            this: account,
            caller: account,
            value: U256::ZERO,
            timestamp: self.timestamp,
            storage: self.storage.entry(account).or_default(),
        };
        code.call(&mut scope, data)
    }

    /// Reads a storage slot in the namespace of `address`.
    pub fn storage_at(&self, address: Address, slot: B256) -> B256 {
        self.storage
            .get(&address)
            .and_then(|namespace| namespace.get(&slot))
            .copied()
            .unwrap_or_default()
    }

    /// Appends an event to the sink.
    pub fn emit(&mut self, event: AccountEvent) {
        debug!(?event, "emitting");
        self.events.push(event);
    }

    /// All events emitted so far, in order.
    pub fn events(&self) -> &[AccountEvent] {
        &self.events
    }

    /// Captures balances, storage, and the event high-water mark.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            balances: self.balances.clone(),
            storage: self.storage.clone(),
            events_len: self.events.len(),
        }
    }

    /// Rolls ledger state back to a snapshot. Events emitted since are
    /// discarded.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.balances = snapshot.balances;
        self.storage = snapshot.storage;
        self.events.truncate(snapshot.events_len);
    }
}

impl VerifierRegistry for Environment {
    fn verifier(&self, address: Address) -> Option<&dyn SignatureVerifier> {
        self.verifiers.get(&address).map(|v| v.as_ref() as &dyn SignatureVerifier)
    }

    fn wallet(&self, address: Address) -> Option<&dyn ContractWallet> {
        self.wallets.get(&address).map(|w| w.as_ref() as &dyn ContractWallet)
    }
}
