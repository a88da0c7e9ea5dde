//! Simple contract code for call targets.

use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use msa_account::{CallScope, ContractCode};

/// Records every call it receives and echoes the call data back.
#[derive(Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<(Address, U256, Bytes)>>>,
}

impl CallRecorder {
    /// A fresh recorder with no calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `(caller, value, data)` triples received so far, in order.
    pub fn calls(&self) -> Vec<(Address, U256, Bytes)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ContractCode for CallRecorder {
    fn call(&self, ctx: &mut CallScope<'_>, data: &[u8]) -> Result<Bytes, Bytes> {
        self.calls.lock().unwrap().push((ctx.caller, ctx.value, Bytes::copy_from_slice(data)));
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Reverts every call with a fixed payload.
#[derive(Clone)]
pub struct Reverter(pub Bytes);

impl Reverter {
    /// Reverts with the given payload.
    pub fn with(payload: &'static [u8]) -> Self {
        Self(Bytes::from_static(payload))
    }
}

impl ContractCode for Reverter {
    fn call(&self, _ctx: &mut CallScope<'_>, _data: &[u8]) -> Result<Bytes, Bytes> {
        Err(self.0.clone())
    }
}

/// Writes `data[32..64]` into the slot named by `data[0..32]`, in whatever
/// storage namespace it runs against. Under delegated execution that is the
/// account's namespace.
#[derive(Clone, Default)]
pub struct StorageWriter;

impl ContractCode for StorageWriter {
    fn call(&self, ctx: &mut CallScope<'_>, data: &[u8]) -> Result<Bytes, Bytes> {
        if data.len() < 64 {
            return Err(Bytes::from_static(b"storage writer needs slot and value"));
        }
        let slot = B256::from_slice(&data[..32]);
        let value = B256::from_slice(&data[32..64]);
        ctx.storage.insert(slot, value);
        Ok(Bytes::new())
    }
}
