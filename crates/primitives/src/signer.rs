//! Opaque signer identities.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// An opaque, byte-encoded reference to a signing key.
///
/// Exactly 20 bytes is a native recoverable key (an address). Anything
/// longer is `verifier (20) ‖ key material`, resolved through an external
/// verifier. Shorter encodings are malformed and never verify.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerId(pub Bytes);

impl SignerId {
    /// Builds a native signer identity from an address.
    pub fn native(address: Address) -> Self {
        Self(Bytes::copy_from_slice(address.as_slice()))
    }

    /// Builds a delegated identity from a verifier address and key material.
    pub fn delegated(verifier: Address, key: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(20 + key.len());
        raw.extend_from_slice(verifier.as_slice());
        raw.extend_from_slice(key);
        Self(raw.into())
    }

    /// Whether this identity is a bare 20-byte native key.
    pub fn is_native(&self) -> bool {
        self.0.len() == 20
    }

    /// Whether this identity is long enough to reference a verifier.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() >= 20
    }

    /// Splits a delegated identity into `(verifier, key material)`.
    ///
    /// Returns `None` for native or malformed identities.
    pub fn split_delegated(&self) -> Option<(Address, &[u8])> {
        if self.0.len() <= 20 {
            return None;
        }
        Some((Address::from_slice(&self.0[0..20]), &self.0[20..]))
    }

    /// The native address, when this is a 20-byte identity.
    pub fn as_native(&self) -> Option<Address> {
        self.is_native().then(|| Address::from_slice(&self.0))
    }

    /// The canonical unique id used for ordering and deduplication.
    pub fn uid(&self) -> B256 {
        keccak256(&self.0)
    }
}

impl core::fmt::Display for SignerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Ord for SignerId {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.uid().cmp(&other.uid())
    }
}

impl PartialOrd for SignerId {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Address> for SignerId {
    fn from(address: Address) -> Self {
        Self::native(address)
    }
}
