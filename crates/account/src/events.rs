//! Events emitted by the account core.

use alloy_primitives::{Address, Bytes};
use msa_primitives::{CallType, ModuleType};
use serde::{Deserialize, Serialize};

/// Diagnostic events collected by the environment's sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum AccountEvent {
    /// A module was installed.
    #[serde(rename_all = "camelCase")]
    ModuleInstalled {
        /// The account the module was installed on.
        account: Address,
        /// The role it was installed as.
        module_type: ModuleType,
        /// The module address.
        module: Address,
    },
    /// A module was uninstalled.
    #[serde(rename_all = "camelCase")]
    ModuleUninstalled {
        /// The account the module was removed from.
        account: Address,
        /// The role it was removed from.
        module_type: ModuleType,
        /// The module address.
        module: Address,
    },
    /// A sub-call failed under try semantics and was skipped.
    ///
    /// Delegated failures are reported as [`CallType::Call`].
    #[serde(rename_all = "camelCase")]
    TryExecuteFail {
        /// The executing account.
        account: Address,
        /// The topology of the failed sub-call.
        call_type: CallType,
        /// The raw revert payload.
        revert: Bytes,
    },
}
