//! Signing helpers for multi-signature payloads.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use msa_primitives::SignerId;

/// Fresh random keys, pre-sorted in canonical signer order.
pub fn sorted_random_keys(n: usize) -> Vec<PrivateKeySigner> {
    let mut keys: Vec<PrivateKeySigner> = (0..n).map(|_| PrivateKeySigner::random()).collect();
    keys.sort_by_key(|key| SignerId::native(key.address()).uid());
    keys
}

/// The native signer identities of the given keys, in key order.
pub fn signer_ids(keys: &[PrivateKeySigner]) -> Vec<SignerId> {
    keys.iter().map(|key| SignerId::native(key.address())).collect()
}

/// Signs `hash` with every key and packs the result as the ABI pair
/// `(bytes[] signers, bytes[] signatures)`, sorted in canonical order.
pub fn multisig_signature(keys: &[PrivateKeySigner], hash: B256) -> Bytes {
    let mut entries: Vec<(SignerId, Bytes)> = keys
        .iter()
        .map(|key| {
            let signature: Bytes =
                key.sign_hash_sync(&hash).unwrap().as_bytes().to_vec().into();
            (SignerId::native(key.address()), signature)
        })
        .collect();
    entries.sort_by_key(|(signer, _)| signer.uid());

    let (signers, signatures): (Vec<Bytes>, Vec<Bytes>) =
        entries.into_iter().map(|(signer, sig)| (signer.0, sig)).unzip();
    (signers, signatures).abi_encode_params().into()
}

/// Builds a namespaced nonce: `validator (20) ‖ zeros (4) ‖ sequence (8)`.
pub fn nonce_with_validator(validator: Address, sequence: u64) -> U256 {
    let mut raw = [0u8; 32];
    raw[..20].copy_from_slice(validator.as_slice());
    raw[24..].copy_from_slice(&sequence.to_be_bytes());
    U256::from_be_bytes(raw)
}
