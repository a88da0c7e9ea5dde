//! A validator module keeping a weighted threshold signer set per account.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use msa_account::{Environment, ModuleContract, ValidatorModule};
use msa_multisig::{MultisigError, SignerSet};
use msa_primitives::{
    ModuleType, PackedOperation, SignerId, SIG_VALIDATION_FAILED, SIG_VALIDATION_SUCCESS,
};
use tracing::debug;

/// Errors from the validator's management operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    /// The account has no signer set with this module.
    #[error("validator not installed on account {0}")]
    NotInstalled(Address),
    /// Only the account may manage its own signers.
    #[error("unauthorized caller {0}")]
    Unauthorized(Address),
    /// A signer-set mutation was rejected.
    #[error(transparent)]
    Multisig(#[from] MultisigError),
}

/// A validator module backing operation signatures with a per-account
/// weighted threshold signer set.
///
/// Install data is the ABI tuple `(bytes[] signers, uint256 threshold,
/// uint256[] weights)`; an empty weights array assigns everyone weight 1.
/// Cloning shares state, so keep a clone as a management handle after
/// registering the module.
#[derive(Clone, Default)]
pub struct MultisigValidator {
    sets: Arc<Mutex<HashMap<Address, SignerSet>>>,
}

impl MultisigValidator {
    /// A validator with no configured accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// ABI-encodes install data for the given configuration.
    pub fn encode_install_data(
        signers: &[SignerId],
        threshold: u64,
        weights: &[u64],
    ) -> Bytes {
        let signers: Vec<Bytes> = signers.iter().map(|signer| signer.0.clone()).collect();
        let weights: Vec<U256> = weights.iter().copied().map(U256::from).collect();
        (signers, U256::from(threshold), weights).abi_encode_params().into()
    }

    /// A snapshot of the signer set configured for `account`.
    pub fn signer_set(&self, account: Address) -> Option<SignerSet> {
        self.sets.lock().unwrap().get(&account).cloned()
    }

    /// Adds equally-weighted signers to the account's set.
    pub fn add_signers(
        &self,
        caller: Address,
        account: Address,
        signers: Vec<SignerId>,
    ) -> Result<(), ValidatorError> {
        self.with_set(caller, account, |set| set.add_signers(signers))
    }

    /// Removes signers from the account's set.
    pub fn remove_signers(
        &self,
        caller: Address,
        account: Address,
        signers: &[SignerId],
    ) -> Result<(), ValidatorError> {
        self.with_set(caller, account, |set| set.remove_signers(signers))
    }

    /// Updates the account's threshold.
    pub fn set_threshold(
        &self,
        caller: Address,
        account: Address,
        threshold: u64,
    ) -> Result<(), ValidatorError> {
        self.with_set(caller, account, |set| set.set_threshold(threshold))
    }

    /// Updates weights of the account's signers.
    pub fn set_signer_weights(
        &self,
        caller: Address,
        account: Address,
        signers: &[SignerId],
        weights: &[u64],
    ) -> Result<(), ValidatorError> {
        self.with_set(caller, account, |set| set.set_signer_weights(signers, weights))
    }

    fn with_set(
        &self,
        caller: Address,
        account: Address,
        mutate: impl FnOnce(&mut SignerSet) -> Result<(), MultisigError>,
    ) -> Result<(), ValidatorError> {
        if caller != account {
            return Err(ValidatorError::Unauthorized(caller));
        }
        let mut sets = self.sets.lock().unwrap();
        let set = sets.get_mut(&account).ok_or(ValidatorError::NotInstalled(account))?;
        mutate(set).map_err(ValidatorError::from)
    }
}

impl ModuleContract for MultisigValidator {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Validator
    }

    fn on_install(
        &mut self,
        _env: &mut Environment,
        account: Address,
        data: &[u8],
    ) -> Result<(), Bytes> {
        let mut sets = self.sets.lock().unwrap();
        if sets.contains_key(&account) {
            // Reinstall with a surviving configuration is a no-op.
            return Ok(());
        }
        let (raw_signers, threshold, weights) =
            <(Vec<Bytes>, U256, Vec<U256>)>::abi_decode_params(data)
                .map_err(|err| Bytes::from(err.to_string().into_bytes()))?;
        let signers: Vec<SignerId> = raw_signers.into_iter().map(SignerId).collect();
        let threshold = u64::try_from(threshold).unwrap_or(u64::MAX);

        let set = if weights.is_empty() {
            SignerSet::with_signers(signers, threshold)
        } else {
            if weights.len() != signers.len() {
                return Err(Bytes::from(
                    MultisigError::MismatchedLength.to_string().into_bytes(),
                ));
            }
            let weights = weights.into_iter().map(|w| u64::try_from(w).unwrap_or(u64::MAX));
            SignerSet::with_weighted_signers(signers.into_iter().zip(weights), threshold)
        }
        .map_err(|err| Bytes::from(err.to_string().into_bytes()))?;

        sets.insert(account, set);
        Ok(())
    }

    fn on_uninstall(
        &mut self,
        _env: &mut Environment,
        account: Address,
        _data: &[u8],
    ) -> Result<(), Bytes> {
        self.sets.lock().unwrap().remove(&account);
        Ok(())
    }

    fn as_validator(&mut self) -> Option<&mut dyn ValidatorModule> {
        Some(self)
    }
}

impl ValidatorModule for MultisigValidator {
    fn validate_operation(
        &mut self,
        env: &mut Environment,
        account: Address,
        op: &PackedOperation,
        op_hash: B256,
    ) -> U256 {
        let sets = self.sets.lock().unwrap();
        let Some(set) = sets.get(&account) else {
            return SIG_VALIDATION_FAILED;
        };
        let accepted = match <(Vec<Bytes>, Vec<Bytes>)>::abi_decode_params(&op.signature) {
            Ok((raw_signers, signatures)) => {
                let signers: Vec<SignerId> = raw_signers.into_iter().map(SignerId).collect();
                set.validate(&*env, op_hash, &signers, &signatures)
            }
            Err(err) => {
                debug!(%err, %account, "malformed multisig payload");
                false
            }
        };
        if accepted {
            SIG_VALIDATION_SUCCESS
        } else {
            SIG_VALIDATION_FAILED
        }
    }
}
