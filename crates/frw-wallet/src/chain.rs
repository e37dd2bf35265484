//! Interfaces to the blockchain client.
//!
//! The wallet never talks to the network itself. Reading account keys
//! and sending the add-and-revoke transaction are delegated to
//! implementations of these traits supplied by the embedding app.

use async_trait::async_trait;
use frw_types::{AccountKeyDescriptor, FlowAddress, Result};

/// Read-only access to on-chain account state.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Returns every key on the account, revoked ones included.
    ///
    /// # Errors
    ///
    /// Implementations report network or decoding failures as
    /// [`FrwError::ChainError`](frw_types::FrwError::ChainError).
    async fn get_full_account_keys(&self, address: &FlowAddress) -> Result<Vec<AccountKeyDescriptor>>;
}

/// Submits the key rotation transaction.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Adds `new_public_keys` (bare hex, no `0x`) and revokes the keys at
    /// `revoke_indexes` in one transaction, authorised by the account's
    /// current full-weight key.
    ///
    /// Returns the transaction id once the transaction is sealed.
    async fn add_and_revoke_keys(&self, new_public_keys: &[String], revoke_indexes: &[u32]) -> Result<String>;
}
