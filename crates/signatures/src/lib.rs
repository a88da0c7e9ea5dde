#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod envelope;
pub use envelope::{
    decode_contents_descr, encode_domain, personal_sign_struct_hash,
    typed_data_sign_struct_hash, typed_data_sign_typehash, TypedDataSig,
};

pub mod verify;
pub use verify::{is_valid_signature_now, ContractWallet, SignatureVerifier, VerifierRegistry};
