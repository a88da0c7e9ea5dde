//! Execution-mode descriptors.
//!
//! A mode is a fixed 32-byte tag: `call_type (1) ‖ exec_type (1) ‖
//! unused (4) ‖ selector (4) ‖ payload (22)`. The selector and payload
//! bytes are reserved for extensions and carried through untouched.

use alloy_primitives::{FixedBytes, B256};
use serde::{Deserialize, Serialize};

/// Call topology of an execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    /// A single `(target, value, data)` call.
    Call,
    /// An array of `(target, value, data)` calls, executed in order.
    Batch,
    /// A delegated call sharing the account's storage context.
    Delegate,
}

impl CallType {
    /// Returns the wire byte for this call type.
    pub const fn byte(self) -> u8 {
        match self {
            Self::Call => 0x00,
            Self::Batch => 0x01,
            Self::Delegate => 0xFF,
        }
    }

    /// Parses a wire byte. Unknown bytes return `None`.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Call),
            0x01 => Some(Self::Batch),
            0xFF => Some(Self::Delegate),
            _ => None,
        }
    }
}

/// Failure policy of an execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecType {
    /// Abort the whole execution on the first failing sub-call.
    Default,
    /// Catch each failure, report it, and continue with remaining calls.
    Try,
}

impl ExecType {
    /// Returns the wire byte for this exec type.
    pub const fn byte(self) -> u8 {
        match self {
            Self::Default => 0x00,
            Self::Try => 0x01,
        }
    }

    /// Parses a wire byte. Unknown bytes return `None`.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Default),
            0x01 => Some(Self::Try),
            _ => None,
        }
    }
}

/// A packed 32-byte execution-mode descriptor.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionMode(pub B256);

impl ExecutionMode {
    /// Packs the mode fields into a 32-byte descriptor.
    pub fn encode(
        call_type: CallType,
        exec_type: ExecType,
        selector: FixedBytes<4>,
        payload: FixedBytes<22>,
    ) -> Self {
        let mut raw = [0u8; 32];
        raw[0] = call_type.byte();
        raw[1] = exec_type.byte();
        raw[6..10].copy_from_slice(selector.as_slice());
        raw[10..32].copy_from_slice(payload.as_slice());
        Self(B256::from(raw))
    }

    /// A descriptor with the given call and exec types and empty extension bytes.
    pub fn simple(call_type: CallType, exec_type: ExecType) -> Self {
        Self::encode(call_type, exec_type, FixedBytes::ZERO, FixedBytes::ZERO)
    }

    /// The raw call-type byte, before interpretation.
    pub fn call_type_byte(&self) -> u8 {
        self.0[0]
    }

    /// The raw exec-type byte, before interpretation.
    pub fn exec_type_byte(&self) -> u8 {
        self.0[1]
    }

    /// The interpreted call type, if known.
    pub fn call_type(&self) -> Option<CallType> {
        CallType::from_byte(self.call_type_byte())
    }

    /// The interpreted exec type, if known.
    pub fn exec_type(&self) -> Option<ExecType> {
        ExecType::from_byte(self.exec_type_byte())
    }

    /// The 4-byte extension selector.
    pub fn selector(&self) -> FixedBytes<4> {
        FixedBytes::from_slice(&self.0[6..10])
    }

    /// The 22-byte extension payload.
    pub fn payload(&self) -> FixedBytes<22> {
        FixedBytes::from_slice(&self.0[10..32])
    }

    /// Whether both the call type and the exec type are known.
    pub fn is_supported(&self) -> bool {
        self.call_type().is_some() && self.exec_type().is_some()
    }
}

impl From<B256> for ExecutionMode {
    fn from(raw: B256) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::fixed_bytes;

    use super::*;

    #[test]
    fn encodes_and_decodes_mode() {
        let selector = fixed_bytes!("12345678");
        let payload = FixedBytes::<22>::ZERO;
        let mode = ExecutionMode::encode(CallType::Batch, ExecType::Try, selector, payload);

        assert_eq!(mode.call_type(), Some(CallType::Batch));
        assert_eq!(mode.exec_type(), Some(ExecType::Try));
        assert_eq!(mode.selector(), selector);
        assert_eq!(mode.payload(), payload);
        assert!(mode.is_supported());
    }

    #[test]
    fn mode_layout_is_fixed() {
        let mode = ExecutionMode::encode(
            CallType::Delegate,
            ExecType::Try,
            fixed_bytes!("aabbccdd"),
            FixedBytes::<22>::ZERO,
        );
        assert_eq!(mode.0[0], 0xFF);
        assert_eq!(mode.0[1], 0x01);
        assert_eq!(&mode.0[2..6], &[0u8; 4]);
        assert_eq!(&mode.0[6..10], &[0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn unknown_bytes_are_preserved() {
        let mut raw = [0u8; 32];
        raw[0] = 0x42;
        raw[1] = 0x17;
        let mode = ExecutionMode(B256::from(raw));

        assert_eq!(mode.call_type(), None);
        assert_eq!(mode.exec_type(), None);
        assert_eq!(mode.call_type_byte(), 0x42);
        assert_eq!(mode.exec_type_byte(), 0x17);
        assert!(!mode.is_supported());
    }
}
