//! Owner and pause gating.
//!
//! A single owner may pause the vault, resume it, and hand ownership to
//! someone else. While paused, every state-changing entry point fails with
//! [`VaultError::Paused`], oracle callbacks included. A refused callback
//! leaves its pending entry untouched, so the oracle can retry after the
//! vault resumes.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::vault::error::VaultError;

/// Ownership and pause state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    paused: bool,
}

impl AccessControl {
    /// Unpaused, owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            paused: false,
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Fails unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &Address) -> Result<(), VaultError> {
        if caller == &self.owner {
            Ok(())
        } else {
            Err(VaultError::Unauthorized(caller.clone()))
        }
    }

    /// Fails while paused.
    pub fn ensure_active(&self) -> Result<(), VaultError> {
        if self.paused {
            Err(VaultError::Paused)
        } else {
            Ok(())
        }
    }

    /// Returns `true` if the state changed.
    pub fn pause(&mut self, caller: &Address) -> Result<bool, VaultError> {
        self.ensure_owner(caller)?;
        let changed = !self.paused;
        self.paused = true;
        Ok(changed)
    }

    /// Returns `true` if the state changed.
    pub fn unpause(&mut self, caller: &Address) -> Result<bool, VaultError> {
        self.ensure_owner(caller)?;
        let changed = self.paused;
        self.paused = false;
        Ok(changed)
    }

    /// Hands ownership to `new_owner` and returns the previous owner.
    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<Address, VaultError> {
        self.ensure_owner(caller)?;
        Ok(std::mem::replace(&mut self.owner, new_owner))
    }
}
