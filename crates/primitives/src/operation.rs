//! Packed operations and their canonical hash.
//!
//! The hash is computed the same way entry-point contracts do it:
//! variable-length fields are hashed first, the fixed-size struct is
//! ABI-encoded and hashed, and the result is bound to the coordinator
//! address and chain id with a final keccak.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolValue};
use serde::{Deserialize, Serialize};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct OperationPackedForHash {
        address sender;
        uint256 nonce;
        bytes32 hashInitCode;
        bytes32 hashCallData;
        bytes32 accountGasLimits;
        uint256 preVerificationGas;
        bytes32 gasFees;
        bytes32 hashPaymasterAndData;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct OperationHashEncoded {
        bytes32 encodedHash;
        address coordinator;
        uint256 chainId;
    }
}

/// A packed, signed operation bundle submitted for validation.
///
/// Gas limits and fee fields are packed `(high 128 ‖ low 128)` pairs; the
/// core never unpacks them, it only feeds them into the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedOperation {
    /// The account the operation acts on.
    pub sender: Address,
    /// Namespaced nonce: high 192 bits are the key, low 64 bits the sequence.
    pub nonce: U256,
    /// Factory address and data for counterfactual deployment.
    pub init_code: Bytes,
    /// The call the account will execute once validated.
    pub call_data: Bytes,
    /// Packed verification and call gas limits.
    pub account_gas_limits: B256,
    /// Gas paid up front to compensate the coordinator.
    pub pre_verification_gas: U256,
    /// Packed max priority fee and max fee per gas.
    pub gas_fees: B256,
    /// Paymaster address and payload, empty when self-funded.
    pub paymaster_and_data: Bytes,
    /// Raw signature material, interpreted by the active validator.
    pub signature: Bytes,
}

impl PackedOperation {
    /// The nonce key namespace (high 192 bits of the nonce).
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> 64usize
    }

    /// The nonce sequence number (low 64 bits of the nonce).
    pub fn nonce_sequence(&self) -> u64 {
        self.nonce.as_limbs()[0]
    }

    /// The validator address encoded in the leading 20 bytes of the nonce.
    ///
    /// A zero address means "no module selected"; the account falls back to
    /// its embedded verifier.
    pub fn nonce_validator(&self) -> Address {
        Address::from_slice(&self.nonce.to_be_bytes::<32>()[0..20])
    }
}

impl From<&PackedOperation> for OperationPackedForHash {
    fn from(op: &PackedOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            hashInitCode: keccak256(&op.init_code),
            hashCallData: keccak256(&op.call_data),
            accountGasLimits: op.account_gas_limits,
            preVerificationGas: op.pre_verification_gas,
            gasFees: op.gas_fees,
            hashPaymasterAndData: keccak256(&op.paymaster_and_data),
        }
    }
}

/// Computes the canonical hash of a packed operation.
///
/// This hash is the identity the operation is signed over; it commits to
/// every field except the signature, plus the coordinator and chain id.
pub fn hash_operation(op: &PackedOperation, coordinator: Address, chain_id: u64) -> B256 {
    let packed = OperationPackedForHash::from(op);
    let encoded = OperationHashEncoded {
        encodedHash: keccak256(packed.abi_encode()),
        coordinator,
        chainId: U256::from(chain_id),
    };
    keccak256(encoded.abi_encode())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, bytes};

    use super::*;

    fn sample_op() -> PackedOperation {
        PackedOperation {
            sender: address!("1306b01bc3e4ad202612d3843387e94737673f53"),
            nonce: U256::from(8942),
            init_code: bytes!("6942069420694206942069420694206942069420"),
            call_data: bytes!("0000000000000000000000000000000000000000080085"),
            account_gas_limits: B256::with_last_byte(1),
            pre_verification_gas: U256::from(100),
            gas_fees: B256::with_last_byte(2),
            paymaster_and_data: Bytes::new(),
            signature: bytes!("da0929f527cded8d0a1eaf2e8861d7f7e2d8160b7b13942f99dd367df4473a"),
        }
    }

    #[test]
    fn hash_commits_to_every_field_except_signature() {
        let coordinator = address!("66a15edcc3b50a663e72f1457ffd49b9ae284ddc");
        let base = hash_operation(&sample_op(), coordinator, 1337);

        let mut signed_differently = sample_op();
        signed_differently.signature = bytes!("00");
        assert_eq!(hash_operation(&signed_differently, coordinator, 1337), base);

        let mut other_nonce = sample_op();
        other_nonce.nonce = U256::from(8943);
        assert_ne!(hash_operation(&other_nonce, coordinator, 1337), base);

        let mut other_call = sample_op();
        other_call.call_data = Bytes::new();
        assert_ne!(hash_operation(&other_call, coordinator, 1337), base);

        assert_ne!(hash_operation(&sample_op(), coordinator, 1), base);
        assert_ne!(
            hash_operation(&sample_op(), address!("0000000000000000000000000000000000000001"), 1337),
            base
        );
    }

    #[test]
    fn operation_serde_round_trip() {
        let op = sample_op();
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"preVerificationGas\""));
        assert!(json.contains("\"callData\""));
        let back: PackedOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn nonce_namespace_split() {
        let validator = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        let mut raw = [0u8; 32];
        raw[0..20].copy_from_slice(validator.as_slice());
        raw[31] = 7;

        let op = PackedOperation { nonce: U256::from_be_bytes(raw), ..Default::default() };
        assert_eq!(op.nonce_validator(), validator);
        assert_eq!(op.nonce_sequence(), 7);
        assert_eq!(op.nonce_key(), U256::from_be_bytes(raw) >> 64usize);
    }
}
