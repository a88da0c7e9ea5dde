//! Nested typed-data signature envelopes.
//!
//! An application signature is carried together with the application's
//! domain separator and a description of the signed contents:
//! `signature ‖ app_separator (32) ‖ contents_hash (32) ‖ contents_descr ‖
//! descr_len (2, big-endian)`. Decoding is total; malformed envelopes decode
//! to all-empty defaults and fail verification downstream.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

/// A decoded typed-data signature envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypedDataSig {
    /// The inner signature, interpreted by the signer's own scheme.
    pub signature: Bytes,
    /// The application's domain separator.
    pub app_separator: B256,
    /// Struct hash of the signed contents in the application's domain.
    pub contents_hash: B256,
    /// EIP-712 style descriptor of the contents type.
    pub contents_descr: String,
}

impl TypedDataSig {
    /// Encodes the envelope. Descriptors longer than `u16::MAX` bytes are
    /// not representable.
    pub fn encode(&self) -> Bytes {
        let descr = self.contents_descr.as_bytes();
        debug_assert!(descr.len() <= u16::MAX as usize);
        let mut out = Vec::with_capacity(self.signature.len() + 66 + descr.len());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(self.app_separator.as_slice());
        out.extend_from_slice(self.contents_hash.as_slice());
        out.extend_from_slice(descr);
        out.extend_from_slice(&(descr.len() as u16).to_be_bytes());
        out.into()
    }

    /// Decodes an envelope. Buffers shorter than the 66-byte fixed tail, or
    /// whose descriptor length overruns the buffer, decode to defaults.
    pub fn decode(encoded: &[u8]) -> Self {
        let total = encoded.len();
        if total < 66 {
            return Self::default();
        }
        let descr_len =
            u16::from_be_bytes([encoded[total - 2], encoded[total - 1]]) as usize;
        if descr_len + 66 > total {
            return Self::default();
        }
        let descr_end = total - 2;
        let descr_start = descr_end - descr_len;
        let hash_start = descr_start - 32;
        let sep_start = hash_start - 32;
        Self {
            signature: Bytes::copy_from_slice(&encoded[..sep_start]),
            app_separator: B256::from_slice(&encoded[sep_start..hash_start]),
            contents_hash: B256::from_slice(&encoded[hash_start..descr_start]),
            contents_descr: String::from_utf8_lossy(&encoded[descr_start..descr_end])
                .into_owned(),
        }
    }
}

/// Struct hash nesting a plain signed message into the account's domain.
pub fn personal_sign_struct_hash(message_hash: B256) -> B256 {
    let typehash = keccak256("PersonalSign(bytes prefixed)");
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(typehash.as_slice());
    buf[32..].copy_from_slice(message_hash.as_slice());
    keccak256(buf)
}

/// Typehash of the nested typed-data struct for the given contents type.
pub fn typed_data_sign_typehash(contents_name: &str, contents_type: &str) -> B256 {
    keccak256(format!(
        "TypedDataSign({contents_name} contents,string name,string version,uint256 chainId,\
         address verifyingContract,bytes32 salt){contents_type}"
    ))
}

/// Struct hash nesting application contents into the account's domain.
///
/// `domain_bytes` is the ABI encoding of the application domain fields, see
/// [`encode_domain`]. Returns `None` when the descriptor does not parse.
pub fn typed_data_sign_struct_hash(
    contents_descr: &str,
    contents_hash: B256,
    domain_bytes: &[u8],
) -> Option<B256> {
    let (name, ty) = decode_contents_descr(contents_descr)?;
    let typehash = typed_data_sign_typehash(name, ty);
    let mut buf = Vec::with_capacity(64 + domain_bytes.len());
    buf.extend_from_slice(typehash.as_slice());
    buf.extend_from_slice(contents_hash.as_slice());
    buf.extend_from_slice(domain_bytes);
    Some(keccak256(buf))
}

/// ABI-encodes an application domain as the five 32-byte words the nested
/// struct hash commits to.
pub fn encode_domain(
    name: &str,
    version: &str,
    chain_id: u64,
    verifying_contract: Address,
    salt: B256,
) -> Bytes {
    let mut out = Vec::with_capacity(160);
    out.extend_from_slice(keccak256(name).as_slice());
    out.extend_from_slice(keccak256(version).as_slice());
    out.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    out.extend_from_slice(&[0u8; 12]);
    out.extend_from_slice(verifying_contract.as_slice());
    out.extend_from_slice(salt.as_slice());
    out.into()
}

/// Splits a contents descriptor into `(type name, full type)`.
///
/// Implicit form: `Name(...)` — the descriptor is the full type and the
/// name is everything before the first parenthesis. Explicit form:
/// `TypeA(...)TypeB(...)Name` — the name trails the last closing
/// parenthesis and the rest is the full type. Names containing spaces,
/// commas, parentheses or NUL bytes are invalid.
pub fn decode_contents_descr(contents_descr: &str) -> Option<(&str, &str)> {
    let buffer = contents_descr.as_bytes();
    let last = *buffer.last()?;
    if last == b')' {
        // Implicit: scan forward for the opening parenthesis.
        for (i, &byte) in buffer.iter().enumerate() {
            if byte == b'(' {
                if i == 0 {
                    break;
                }
                return Some((&contents_descr[..i], contents_descr));
            }
            if is_forbidden_char(byte) {
                break;
            }
        }
    } else {
        // Explicit: scan backward for the closing parenthesis.
        for i in (0..buffer.len()).rev() {
            let byte = buffer[i];
            if byte == b')' {
                return Some((&contents_descr[i + 1..], &contents_descr[..i + 1]));
            }
            if is_forbidden_char(byte) {
                break;
            }
        }
    }
    None
}

fn is_forbidden_char(byte: u8) -> bool {
    matches!(byte, 0x00 | b' ' | b',' | b'(' | b')')
}
