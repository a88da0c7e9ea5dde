#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod account;
pub use account::AccountCore;

pub mod environment;
pub use environment::{Environment, InsufficientBalance, Snapshot};

pub mod error;
pub use error::AccountError;

pub mod events;
pub use events::AccountEvent;

pub mod interface;
pub use interface::{
    CallScope, ContractCode, FallbackModule, HookModule, ModuleContract, ValidatorModule,
};
