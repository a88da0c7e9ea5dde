#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod set;
pub use set::{MultisigError, SignerSet};
