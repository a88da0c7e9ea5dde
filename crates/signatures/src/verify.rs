//! Signature verification over opaque signer identities.
//!
//! A 20-byte identity is checked by ECDSA recovery against the prehash,
//! falling back to a contract wallet registered at that address. Longer
//! identities delegate to an external verifier named by their first 20
//! bytes. Every failure mode is a soft `false`.

use alloy_primitives::{Address, Signature, B256};
use msa_primitives::SignerId;
use tracing::debug;

/// An external verifier contract checking signatures over arbitrary key
/// material.
pub trait SignatureVerifier {
    /// Returns whether `signature` is valid for `hash` under `key`.
    fn verify(&self, key: &[u8], hash: B256, signature: &[u8]) -> bool;
}

/// A contract wallet answering smart-contract signature checks.
pub trait ContractWallet {
    /// Returns whether the wallet considers `signature` valid for `hash`.
    fn is_valid_signature(&self, hash: B256, signature: &[u8]) -> bool;
}

/// Lookup surface for the contracts signature verification can reach.
pub trait VerifierRegistry {
    /// The external verifier deployed at `address`, if any.
    fn verifier(&self, address: Address) -> Option<&dyn SignatureVerifier>;

    /// The contract wallet deployed at `address`, if any.
    fn wallet(&self, address: Address) -> Option<&dyn ContractWallet>;
}

/// Checks whether `signature` is currently valid for `hash` under the
/// given signer identity.
pub fn is_valid_signature_now(
    registry: &dyn VerifierRegistry,
    signer: &SignerId,
    hash: B256,
    signature: &[u8],
) -> bool {
    if let Some(address) = signer.as_native() {
        return verify_native(registry, address, hash, signature);
    }
    let Some((verifier, key)) = signer.split_delegated() else {
        debug!(len = signer.0.len(), "rejecting malformed signer identity");
        return false;
    };
    match registry.verifier(verifier) {
        Some(contract) => contract.verify(key, hash, signature),
        None => {
            debug!(%verifier, "no verifier registered for delegated signer");
            false
        }
    }
}

fn verify_native(
    registry: &dyn VerifierRegistry,
    address: Address,
    hash: B256,
    signature: &[u8],
) -> bool {
    if let Ok(sig) = Signature::from_raw(signature) {
        if sig.recover_address_from_prehash(&hash).is_ok_and(|recovered| recovered == address) {
            return true;
        }
    }
    // Recovery mismatch or a non-ECDSA payload. The address may still be a
    // contract wallet with its own validation scheme.
    registry.wallet(address).is_some_and(|wallet| wallet.is_valid_signature(hash, signature))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy_primitives::{address, keccak256, Bytes};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    use super::*;

    struct FixedVerifier {
        key: Vec<u8>,
        signature: Vec<u8>,
    }

    impl SignatureVerifier for FixedVerifier {
        fn verify(&self, key: &[u8], _hash: B256, signature: &[u8]) -> bool {
            key == self.key && signature == self.signature
        }
    }

    struct EchoWallet {
        accepted: Vec<u8>,
    }

    impl ContractWallet for EchoWallet {
        fn is_valid_signature(&self, _hash: B256, signature: &[u8]) -> bool {
            signature == self.accepted
        }
    }

    #[derive(Default)]
    struct TestRegistry {
        verifiers: HashMap<Address, FixedVerifier>,
        wallets: HashMap<Address, EchoWallet>,
    }

    impl VerifierRegistry for TestRegistry {
        fn verifier(&self, address: Address) -> Option<&dyn SignatureVerifier> {
            self.verifiers.get(&address).map(|v| v as &dyn SignatureVerifier)
        }

        fn wallet(&self, address: Address) -> Option<&dyn ContractWallet> {
            self.wallets.get(&address).map(|w| w as &dyn ContractWallet)
        }
    }

    #[test]
    fn native_signer_verifies_by_recovery() {
        let registry = TestRegistry::default();
        let key = PrivateKeySigner::random();
        let signer = SignerId::native(key.address());
        let hash = keccak256(b"state transition");
        let signature = key.sign_hash_sync(&hash).unwrap().as_bytes().to_vec();

        assert!(is_valid_signature_now(&registry, &signer, hash, &signature));

        let other_hash = keccak256(b"different payload");
        assert!(!is_valid_signature_now(&registry, &signer, other_hash, &signature));
        assert!(!is_valid_signature_now(&registry, &signer, hash, &[0u8; 65]));
        assert!(!is_valid_signature_now(&registry, &signer, hash, b"short"));
    }

    #[test]
    fn native_signer_falls_back_to_contract_wallet() {
        let wallet_address = address!("1306b01bc3e4ad202612d3843387e94737673f53");
        let mut registry = TestRegistry::default();
        registry.wallets.insert(wallet_address, EchoWallet { accepted: b"magic".to_vec() });

        let signer = SignerId::native(wallet_address);
        let hash = keccak256(b"payload");

        assert!(is_valid_signature_now(&registry, &signer, hash, b"magic"));
        assert!(!is_valid_signature_now(&registry, &signer, hash, b"not magic"));
    }

    #[test]
    fn delegated_signer_uses_registered_verifier() {
        let verifier_address = address!("6942069420694206942069420694206942069420");
        let mut registry = TestRegistry::default();
        registry.verifiers.insert(
            verifier_address,
            FixedVerifier { key: b"pubkey".to_vec(), signature: b"proof".to_vec() },
        );

        let signer = SignerId::delegated(verifier_address, b"pubkey");
        let hash = keccak256(b"payload");

        assert!(is_valid_signature_now(&registry, &signer, hash, b"proof"));
        assert!(!is_valid_signature_now(&registry, &signer, hash, b"bad proof"));

        let wrong_key = SignerId::delegated(verifier_address, b"other key");
        assert!(!is_valid_signature_now(&registry, &wrong_key, hash, b"proof"));

        let unregistered =
            SignerId::delegated(address!("0000000000000000000000000000000000000bad"), b"pubkey");
        assert!(!is_valid_signature_now(&registry, &unregistered, hash, b"proof"));
    }

    #[test]
    fn malformed_identity_never_verifies() {
        let registry = TestRegistry::default();
        let signer = SignerId(Bytes::copy_from_slice(&[0xab; 19]));
        assert!(!is_valid_signature_now(&registry, &signer, keccak256(b"x"), b"proof"));
    }
}
