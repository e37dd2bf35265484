//! At most one rotation in flight per account.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use frw_types::{FlowAddress, FrwError, Result};

/// Registry of accounts with a rotation in progress.
#[derive(Clone, Debug, Default)]
pub struct AccountLocks {
    active: Arc<Mutex<HashSet<FlowAddress>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `address` until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// [`FrwError::RotationInProgress`] if the account is already claimed.
    pub fn try_acquire(&self, address: FlowAddress) -> Result<AccountGuard> {
        let mut active = self.active.lock().map_err(|e| FrwError::StorageError {
            reason: format!("account lock registry poisoned: {e}"),
        })?;
        if !active.insert(address) {
            return Err(FrwError::RotationInProgress { address });
        }
        Ok(AccountGuard {
            active: Arc::clone(&self.active),
            address,
        })
    }

    /// `true` if a rotation for `address` currently holds a guard.
    pub fn is_locked(&self, address: &FlowAddress) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(address))
            .unwrap_or(false)
    }
}

/// Releases its account when dropped.
#[derive(Debug)]
pub struct AccountGuard {
    active: Arc<Mutex<HashSet<FlowAddress>>>,
    address: FlowAddress,
}

impl AccountGuard {
    pub fn address(&self) -> &FlowAddress {
        &self.address
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        let mut active = match self.active.lock() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&self.address);
    }
}
