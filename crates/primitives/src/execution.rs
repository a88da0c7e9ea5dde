//! Execution payload codecs.
//!
//! Single and delegate payloads are tightly packed (`target ‖ value ‖ data`
//! and `target ‖ data`); batches are ABI-encoded `Execution[]` arrays.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct ExecutionSol {
        address target;
        uint256 value;
        bytes callData;
    }
}

/// One `(target, value, data)` entry of an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// The call target.
    pub target: Address,
    /// Native value forwarded with the call.
    pub value: U256,
    /// Raw call data forwarded to the target.
    pub data: Bytes,
}

impl From<ExecutionSol> for Execution {
    fn from(entry: ExecutionSol) -> Self {
        Self { target: entry.target, value: entry.value, data: entry.callData }
    }
}

impl From<&Execution> for ExecutionSol {
    fn from(entry: &Execution) -> Self {
        Self { target: entry.target, value: entry.value, callData: entry.data.clone() }
    }
}

/// Errors decoding an execution payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionDecodeError {
    /// The packed payload is shorter than its fixed prefix.
    #[error("execution payload too short: {got} bytes, need at least {min}")]
    TooShort {
        /// Actual payload length.
        got: usize,
        /// Minimum length for this payload kind.
        min: usize,
    },
    /// The ABI-encoded batch could not be decoded.
    #[error("invalid batch encoding: {0}")]
    InvalidBatch(String),
}

/// Encodes a single execution as `target (20) ‖ value (32) ‖ data`.
pub fn encode_single(target: Address, value: U256, data: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(52 + data.len());
    out.extend_from_slice(target.as_slice());
    out.extend_from_slice(&value.to_be_bytes::<32>());
    out.extend_from_slice(data);
    out.into()
}

/// Decodes a single execution payload.
pub fn decode_single(data: &[u8]) -> Result<Execution, ExecutionDecodeError> {
    if data.len() < 52 {
        return Err(ExecutionDecodeError::TooShort { got: data.len(), min: 52 });
    }
    Ok(Execution {
        target: Address::from_slice(&data[0..20]),
        value: U256::from_be_slice(&data[20..52]),
        data: Bytes::copy_from_slice(&data[52..]),
    })
}

/// Encodes a batch of executions as an ABI `Execution[]`.
pub fn encode_batch(entries: &[Execution]) -> Bytes {
    let sol_entries: Vec<ExecutionSol> = entries.iter().map(ExecutionSol::from).collect();
    sol_entries.abi_encode().into()
}

/// Decodes an ABI-encoded `Execution[]` batch.
pub fn decode_batch(data: &[u8]) -> Result<Vec<Execution>, ExecutionDecodeError> {
    let entries = <Vec<ExecutionSol>>::abi_decode(data)
        .map_err(|err| ExecutionDecodeError::InvalidBatch(err.to_string()))?;
    Ok(entries.into_iter().map(Execution::from).collect())
}

/// Encodes a delegate execution as `target (20) ‖ data`. Delegated calls
/// carry no value.
pub fn encode_delegate(target: Address, data: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(20 + data.len());
    out.extend_from_slice(target.as_slice());
    out.extend_from_slice(data);
    out.into()
}

/// Decodes a delegate execution payload.
pub fn decode_delegate(data: &[u8]) -> Result<(Address, Bytes), ExecutionDecodeError> {
    if data.len() < 20 {
        return Err(ExecutionDecodeError::TooShort { got: data.len(), min: 20 });
    }
    Ok((Address::from_slice(&data[0..20]), Bytes::copy_from_slice(&data[20..])))
}
