//! Module type identifiers for the four pluggable account roles.

use serde::{Deserialize, Serialize};

/// The role a module plays for an account.
///
/// Numeric values follow the ERC-7579 module type identifiers so that
/// install payloads stay interoperable with existing tooling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleType {
    /// Validates operation signatures during `validate_operation`.
    Validator,
    /// May drive executions through `execute_from_executor`.
    Executor,
    /// Handles calls for a specific 4-byte selector.
    Fallback,
    /// Wraps every mutating entry point with pre/post checks.
    Hook,
}

impl ModuleType {
    /// All module types supported by the account, in identifier order.
    pub const ALL: [Self; 4] = [Self::Validator, Self::Executor, Self::Fallback, Self::Hook];

    /// Returns the wire identifier for this module type.
    pub const fn id(self) -> u32 {
        match self {
            Self::Validator => 1,
            Self::Executor => 2,
            Self::Fallback => 3,
            Self::Hook => 4,
        }
    }

    /// Parses a wire identifier. Unknown identifiers return `None`.
    pub const fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Validator),
            2 => Some(Self::Executor),
            3 => Some(Self::Fallback),
            4 => Some(Self::Hook),
            _ => None,
        }
    }
}
