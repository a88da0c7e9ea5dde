//! Weighted threshold signer sets.

use std::collections::BTreeMap;

use alloy_primitives::{Bytes, B256};
use msa_primitives::SignerId;
use msa_signatures::{is_valid_signature_now, VerifierRegistry};
use serde::Serialize;
use tracing::debug;

/// Errors mutating a signer set. Verification never produces these; an
/// invalid multi-signature is a soft `false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MultisigError {
    /// Signer and weight arrays differ in length.
    #[error("signer and weight arrays differ in length")]
    MismatchedLength,
    /// The signer is already a member.
    #[error("signer already present: {0}")]
    DuplicateSigner(SignerId),
    /// The signer is not a member.
    #[error("unknown signer: {0}")]
    NonexistentSigner(SignerId),
    /// Weights must be positive.
    #[error("invalid weight {1} for signer {0}")]
    InvalidWeight(SignerId, u64),
    /// Identities shorter than 20 bytes are malformed.
    #[error("malformed signer identity: {0}")]
    InvalidSignerFormat(SignerId),
    /// The change would leave less total weight than the threshold.
    #[error("threshold {threshold} exceeds total weight {total_weight}")]
    ThresholdUnreachable {
        /// Total weight the set would have after the change.
        total_weight: u64,
        /// Threshold the set would have after the change.
        threshold: u64,
    },
    /// A non-empty set needs a positive threshold.
    #[error("threshold must be positive for a non-empty signer set")]
    InvalidThreshold,
    /// The summed member weights do not fit in the accumulator.
    #[error("total signer weight overflows u64")]
    WeightOverflow,
}

/// An ordered, deduplicated map of signer identities to weights, plus a
/// threshold.
///
/// Iteration order is the canonical signer order (ascending by the
/// identity's keccak uid), the same order multi-signature payloads must
/// present signers in. Invariants held at all times: total weight is at
/// least the threshold, and a non-empty set has a positive threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerSet {
    signers: BTreeMap<SignerId, u64>,
    threshold: u64,
    total_weight: u64,
}

impl SignerSet {
    /// An empty set with threshold zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from equally-weighted signers.
    pub fn with_signers(
        signers: impl IntoIterator<Item = SignerId>,
        threshold: u64,
    ) -> Result<Self, MultisigError> {
        Self::with_weighted_signers(signers.into_iter().map(|signer| (signer, 1)), threshold)
    }

    /// Builds a set from `(signer, weight)` pairs.
    pub fn with_weighted_signers(
        entries: impl IntoIterator<Item = (SignerId, u64)>,
        threshold: u64,
    ) -> Result<Self, MultisigError> {
        let mut signers = BTreeMap::new();
        for (signer, weight) in entries {
            if !signer.is_well_formed() {
                return Err(MultisigError::InvalidSignerFormat(signer));
            }
            if weight == 0 {
                return Err(MultisigError::InvalidWeight(signer, weight));
            }
            if signers.insert(signer.clone(), weight).is_some() {
                return Err(MultisigError::DuplicateSigner(signer));
            }
        }
        let mut set = Self::new();
        set.commit(signers, threshold)?;
        Ok(set)
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// The summed weight of all members.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Number of member signers.
    pub fn len(&self) -> usize {
        self.signers.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Whether `signer` is a member.
    pub fn contains(&self, signer: &SignerId) -> bool {
        self.signers.contains_key(signer)
    }

    /// The weight of a member signer.
    pub fn weight_of(&self, signer: &SignerId) -> Option<u64> {
        self.signers.get(signer).copied()
    }

    /// Member signers in canonical ascending order.
    pub fn signers(&self) -> impl Iterator<Item = &SignerId> {
        self.signers.keys()
    }

    /// Adds signers with the default weight of 1.
    pub fn add_signers(
        &mut self,
        signers: impl IntoIterator<Item = SignerId>,
    ) -> Result<(), MultisigError> {
        let mut next = self.signers.clone();
        for signer in signers {
            if !signer.is_well_formed() {
                return Err(MultisigError::InvalidSignerFormat(signer));
            }
            if next.insert(signer.clone(), 1).is_some() {
                return Err(MultisigError::DuplicateSigner(signer));
            }
        }
        self.commit(next, self.threshold)
    }

    /// Removes member signers.
    pub fn remove_signers(&mut self, signers: &[SignerId]) -> Result<(), MultisigError> {
        let mut next = self.signers.clone();
        for signer in signers {
            if next.remove(signer).is_none() {
                return Err(MultisigError::NonexistentSigner(signer.clone()));
            }
        }
        self.commit(next, self.threshold)
    }

    /// Updates the threshold.
    pub fn set_threshold(&mut self, threshold: u64) -> Result<(), MultisigError> {
        self.commit(self.signers.clone(), threshold)
    }

    /// Updates the weights of member signers.
    pub fn set_signer_weights(
        &mut self,
        signers: &[SignerId],
        weights: &[u64],
    ) -> Result<(), MultisigError> {
        if signers.len() != weights.len() {
            return Err(MultisigError::MismatchedLength);
        }
        let mut next = self.signers.clone();
        for (signer, &weight) in signers.iter().zip(weights) {
            if weight == 0 {
                return Err(MultisigError::InvalidWeight(signer.clone(), weight));
            }
            let Some(slot) = next.get_mut(signer) else {
                return Err(MultisigError::NonexistentSigner(signer.clone()));
            };
            *slot = weight;
        }
        self.commit(next, self.threshold)
    }

    /// Checks a packed multi-signature against the set.
    ///
    /// Signers must be presented in strictly ascending canonical order
    /// (which also rules out duplicates), each must be a member with a
    /// valid signature, and their summed weight must reach the threshold.
    /// Any structural defect fails the whole batch before weights are
    /// considered.
    pub fn validate(
        &self,
        registry: &dyn VerifierRegistry,
        hash: B256,
        signers: &[SignerId],
        signatures: &[Bytes],
    ) -> bool {
        if signers.len() != signatures.len() {
            debug!(
                signers = signers.len(),
                signatures = signatures.len(),
                "multi-signature arrays differ in length"
            );
            return false;
        }
        let mut previous: Option<B256> = None;
        let mut weight = 0u64;
        for (signer, signature) in signers.iter().zip(signatures) {
            let uid = signer.uid();
            if previous.is_some_and(|prev| prev >= uid) {
                debug!(%signer, "signer out of canonical order");
                return false;
            }
            previous = Some(uid);
            let Some(signer_weight) = self.signers.get(signer) else {
                debug!(%signer, "signer is not a member");
                return false;
            };
            if !is_valid_signature_now(registry, signer, hash, signature) {
                debug!(%signer, "invalid signature");
                return false;
            }
            // Commit bounds the total weight, and strict ordering rules out
            // duplicate members, so this cannot saturate in practice.
            weight = weight.saturating_add(*signer_weight);
        }
        weight >= self.threshold
    }

    // Validates invariants over the candidate state, then swaps it in.
    fn commit(
        &mut self,
        signers: BTreeMap<SignerId, u64>,
        threshold: u64,
    ) -> Result<(), MultisigError> {
        let total_weight = signers
            .values()
            .try_fold(0u64, |acc, weight| acc.checked_add(*weight))
            .ok_or(MultisigError::WeightOverflow)?;
        if !signers.is_empty() && threshold == 0 {
            return Err(MultisigError::InvalidThreshold);
        }
        if total_weight < threshold {
            return Err(MultisigError::ThresholdUnreachable { total_weight, threshold });
        }
        self.signers = signers;
        self.threshold = threshold;
        self.total_weight = total_weight;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy_primitives::{keccak256, Address};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use msa_signatures::{ContractWallet, SignatureVerifier};

    use super::*;

    #[derive(Default)]
    struct EmptyRegistry;

    impl VerifierRegistry for EmptyRegistry {
        fn verifier(&self, _address: Address) -> Option<&dyn SignatureVerifier> {
            None
        }

        fn wallet(&self, _address: Address) -> Option<&dyn ContractWallet> {
            None
        }
    }

    struct KeyedVerifier(HashMap<Vec<u8>, Vec<u8>>);

    impl SignatureVerifier for KeyedVerifier {
        fn verify(&self, key: &[u8], _hash: B256, signature: &[u8]) -> bool {
            self.0.get(key).is_some_and(|expected| expected == signature)
        }
    }

    struct OneVerifierRegistry {
        address: Address,
        verifier: KeyedVerifier,
    }

    impl VerifierRegistry for OneVerifierRegistry {
        fn verifier(&self, address: Address) -> Option<&dyn SignatureVerifier> {
            (address == self.address).then_some(&self.verifier as &dyn SignatureVerifier)
        }

        fn wallet(&self, _address: Address) -> Option<&dyn ContractWallet> {
            None
        }
    }

    /// Keys sorted by canonical signer order, so tests can index
    /// deterministically.
    fn sorted_keys(n: usize) -> Vec<PrivateKeySigner> {
        let mut keys: Vec<PrivateKeySigner> =
            (0..n).map(|_| PrivateKeySigner::random()).collect();
        keys.sort_by_key(|key| SignerId::native(key.address()).uid());
        keys
    }

    fn sign(key: &PrivateKeySigner, hash: B256) -> Bytes {
        key.sign_hash_sync(&hash).unwrap().as_bytes().to_vec().into()
    }

    #[test]
    fn accepts_threshold_weight_in_canonical_order() {
        let keys = sorted_keys(3);
        let ids: Vec<SignerId> =
            keys.iter().map(|key| SignerId::native(key.address())).collect();
        let set = SignerSet::with_signers(ids.clone(), 2).unwrap();

        let hash = keccak256(b"operation");
        let sigs: Vec<Bytes> = keys.iter().map(|key| sign(key, hash)).collect();

        assert!(set.validate(&EmptyRegistry, hash, &ids, &sigs));
        assert!(set.validate(&EmptyRegistry, hash, &ids[..2], &sigs[..2]));
        assert!(!set.validate(&EmptyRegistry, hash, &ids[..1], &sigs[..1]));
    }

    #[test]
    fn rejects_out_of_order_and_duplicate_signers() {
        let keys = sorted_keys(2);
        let ids: Vec<SignerId> =
            keys.iter().map(|key| SignerId::native(key.address())).collect();
        let set = SignerSet::with_signers(ids.clone(), 1).unwrap();

        let hash = keccak256(b"operation");
        let sigs: Vec<Bytes> = keys.iter().map(|key| sign(key, hash)).collect();

        let reversed_ids = vec![ids[1].clone(), ids[0].clone()];
        let reversed_sigs = vec![sigs[1].clone(), sigs[0].clone()];
        assert!(!set.validate(&EmptyRegistry, hash, &reversed_ids, &reversed_sigs));

        let duplicated_ids = vec![ids[0].clone(), ids[0].clone()];
        let duplicated_sigs = vec![sigs[0].clone(), sigs[0].clone()];
        assert!(!set.validate(&EmptyRegistry, hash, &duplicated_ids, &duplicated_sigs));
    }

    #[test]
    fn rejects_non_members_and_bad_signatures_regardless_of_weight() {
        let keys = sorted_keys(3);
        let ids: Vec<SignerId> =
            keys.iter().map(|key| SignerId::native(key.address())).collect();
        // Only the first two are members, but with ample weight.
        let set = SignerSet::with_weighted_signers(
            vec![(ids[0].clone(), 10), (ids[1].clone(), 10)],
            1,
        )
        .unwrap();

        let hash = keccak256(b"operation");
        let sigs: Vec<Bytes> = keys.iter().map(|key| sign(key, hash)).collect();

        // A single non-member fails the batch even though members cover the
        // threshold many times over.
        assert!(!set.validate(&EmptyRegistry, hash, &ids, &sigs));

        let wrong_hash_sig = sign(&keys[1], keccak256(b"other"));
        assert!(!set.validate(
            &EmptyRegistry,
            hash,
            &ids[..2],
            &[sigs[0].clone(), wrong_hash_sig]
        ));

        // Length mismatch.
        assert!(!set.validate(&EmptyRegistry, hash, &ids[..2], &sigs[..1]));
    }

    #[test]
    fn weighted_threshold_example() {
        let keys = sorted_keys(3);
        let ids: Vec<SignerId> =
            keys.iter().map(|key| SignerId::native(key.address())).collect();
        // Weights follow canonical order here, but any assignment works.
        let set = SignerSet::with_weighted_signers(
            vec![(ids[0].clone(), 1), (ids[1].clone(), 2), (ids[2].clone(), 3)],
            3,
        )
        .unwrap();
        assert_eq!(set.total_weight(), 6);

        let hash = keccak256(b"operation");
        let sigs: Vec<Bytes> = keys.iter().map(|key| sign(key, hash)).collect();

        // weight 1 + 2 = 3: accepted.
        assert!(set.validate(&EmptyRegistry, hash, &ids[..2], &sigs[..2]));
        // weight 3 alone: accepted.
        assert!(set.validate(&EmptyRegistry, hash, &ids[2..], &sigs[2..]));
        // weight 1 alone: rejected.
        assert!(!set.validate(&EmptyRegistry, hash, &ids[..1], &sigs[..1]));
    }

    #[test]
    fn empty_signature_accepted_only_at_zero_threshold() {
        let empty = SignerSet::new();
        assert!(empty.validate(&EmptyRegistry, keccak256(b"x"), &[], &[]));

        let keys = sorted_keys(1);
        let set =
            SignerSet::with_signers(vec![SignerId::native(keys[0].address())], 1).unwrap();
        assert!(!set.validate(&EmptyRegistry, keccak256(b"x"), &[], &[]));
    }

    #[test]
    fn delegated_members_verify_through_the_registry() {
        let verifier_address = Address::repeat_byte(0x77);
        let registry = OneVerifierRegistry {
            address: verifier_address,
            verifier: KeyedVerifier(HashMap::from([(
                b"pubkey".to_vec(),
                b"proof".to_vec(),
            )])),
        };

        let delegated = SignerId::delegated(verifier_address, b"pubkey");
        let set = SignerSet::with_signers(vec![delegated.clone()], 1).unwrap();

        let hash = keccak256(b"operation");
        assert!(set.validate(
            &registry,
            hash,
            std::slice::from_ref(&delegated),
            &[Bytes::from_static(b"proof")]
        ));
        assert!(!set.validate(
            &registry,
            hash,
            std::slice::from_ref(&delegated),
            &[Bytes::from_static(b"forged")]
        ));
    }

    #[test]
    fn mutations_are_atomic_and_keep_the_threshold_reachable() {
        let a = SignerId::native(Address::repeat_byte(0x01));
        let b = SignerId::native(Address::repeat_byte(0x02));
        let c = SignerId::native(Address::repeat_byte(0x03));

        let mut set = SignerSet::with_signers(vec![a.clone(), b.clone()], 2).unwrap();
        assert_eq!(set.total_weight(), 2);

        // Batch with one duplicate leaves the set untouched.
        let err = set.add_signers(vec![c.clone(), a.clone()]).unwrap_err();
        assert_eq!(err, MultisigError::DuplicateSigner(a.clone()));
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&c));

        // Removing below the threshold is rejected atomically.
        let err = set.remove_signers(std::slice::from_ref(&b)).unwrap_err();
        assert_eq!(err, MultisigError::ThresholdUnreachable { total_weight: 1, threshold: 2 });
        assert!(set.contains(&b));

        // Raising the threshold beyond total weight is rejected.
        let err = set.set_threshold(5).unwrap_err();
        assert_eq!(err, MultisigError::ThresholdUnreachable { total_weight: 2, threshold: 5 });
        assert_eq!(set.threshold(), 2);

        // Re-weighting makes the removal legal.
        set.set_signer_weights(std::slice::from_ref(&a), &[3]).unwrap();
        set.remove_signers(std::slice::from_ref(&b)).unwrap();
        assert_eq!(set.total_weight(), 3);
    }

    #[test]
    fn rejects_invalid_weights_and_identities() {
        let a = SignerId::native(Address::repeat_byte(0x01));
        let mut set = SignerSet::with_signers(vec![a.clone()], 1).unwrap();

        let err = set.set_signer_weights(std::slice::from_ref(&a), &[0]).unwrap_err();
        assert_eq!(err, MultisigError::InvalidWeight(a.clone(), 0));

        let err = set.set_signer_weights(std::slice::from_ref(&a), &[]).unwrap_err();
        assert_eq!(err, MultisigError::MismatchedLength);

        let stranger = SignerId::native(Address::repeat_byte(0x09));
        let err = set.set_signer_weights(std::slice::from_ref(&stranger), &[2]).unwrap_err();
        assert_eq!(err, MultisigError::NonexistentSigner(stranger));

        let short = SignerId(Bytes::copy_from_slice(&[0xab; 19]));
        let err = set.add_signers(vec![short.clone()]).unwrap_err();
        assert_eq!(err, MultisigError::InvalidSignerFormat(short));

        // A non-empty set cannot drop its threshold to zero.
        assert_eq!(set.set_threshold(0).unwrap_err(), MultisigError::InvalidThreshold);
    }

    #[test]
    fn rejects_overflowing_total_weight() {
        let a = SignerId::native(Address::repeat_byte(0x01));
        let b = SignerId::native(Address::repeat_byte(0x02));

        let err = SignerSet::with_weighted_signers(
            vec![(a.clone(), u64::MAX), (b.clone(), 1)],
            1,
        )
        .unwrap_err();
        assert_eq!(err, MultisigError::WeightOverflow);

        // An addition pushing the sum over the top is rejected atomically.
        let mut set =
            SignerSet::with_weighted_signers(vec![(a.clone(), u64::MAX)], 1).unwrap();
        assert_eq!(set.add_signers(vec![b.clone()]).unwrap_err(), MultisigError::WeightOverflow);
        assert!(!set.contains(&b));
        assert_eq!(set.total_weight(), u64::MAX);
    }
}
