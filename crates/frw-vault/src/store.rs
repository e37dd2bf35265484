//! The versioned, encrypted keyring.
//!
//! [`VaultStore`] is the single writer of keyring state. Every mutation
//! (migration, commit, import, revocation, pointer move) takes the same
//! internal mutex, reads the authoritative document, changes a copy and
//! persists it with one `set`. A failed write leaves the previous
//! document in place.
//!
//! # Load order
//!
//! 1. `keyringStateV3`: returned as is after validation.
//! 2. `keyringStateV2`: migrated, persisted under `keyringStateV3`.
//! 3. `keyringState` (V1): [`FrwError::UnsupportedVersion`].
//! 4. Nothing: [`FrwError::NoVaultFound`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frw_crypto::VaultCipher;
use frw_types::{AccountKeyDescriptor, FrwError, NewAccountKey, Result};
use zeroize::Zeroizing;

use crate::migration::migrate_to_current;
use crate::state::{
    CurrentPointer, KeyringState, KeyringStateV3, VaultRecord, CURRENT_ID_KEY,
    KEYRING_STATE_CURRENT_KEY, KEYRING_STATE_V1_KEY, KEYRING_STATE_V2_KEY,
};
use crate::storage::KeyValueStorage;

// ---------------------------------------------------------------------------
// VaultStore
// ---------------------------------------------------------------------------

/// Versioned keyring on top of a [`KeyValueStorage`].
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct VaultStore {
    storage: Arc<dyn KeyValueStorage>,
    writer: Mutex<()>,
}

impl VaultStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            writer: Mutex::new(()),
        }
    }

    /// Loads the current keyring, migrating older documents forward.
    ///
    /// Only the migrated V3 result is written; the V2 document stays
    /// untouched as a read-only source.
    ///
    /// # Errors
    ///
    /// - [`FrwError::NoVaultFound`] if no keyring of any version exists.
    /// - [`FrwError::UnsupportedVersion`] for a V1-only install or an
    ///   unknown version tag.
    /// - [`FrwError::MigrationError`] if a V2 document cannot be mapped.
    pub fn load(&self) -> Result<KeyringStateV3> {
        let _guard = self.lock_writer();
        self.load_locked()
    }

    /// All records of the current keyring.
    pub fn records(&self) -> Result<Vec<VaultRecord>> {
        Ok(self.load()?.vault)
    }

    /// Appends a freshly derived key and persists the keyring.
    ///
    /// Committing a public key that is already present returns the
    /// existing record id without writing, so a persistence-only retry
    /// after a partial failure is safe.
    ///
    /// # Returns
    ///
    /// The id of the record holding `key`.
    pub fn commit_new_key(&self, key: &NewAccountKey, encrypted_secret: Vec<u8>) -> Result<String> {
        let _guard = self.lock_writer();
        let mut state = self.load_or_empty_locked()?;

        if let Some(existing) = state.record_by_public_key(&key.public_key) {
            tracing::info!(id = %existing.id, "key already committed, skipping write");
            return Ok(existing.id.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        state.vault.push(VaultRecord {
            id: id.clone(),
            public_key: key.public_key.clone(),
            signature_algorithm: key.signature_algorithm,
            encrypted_secret,
        });
        self.persist(&state)?;

        tracing::info!(
            id = %id,
            algorithm = %key.signature_algorithm,
            records = state.vault.len(),
            "committed new vault key"
        );
        Ok(id)
    }

    /// Imports a complete record, e.g. restored from a backup.
    ///
    /// Re-importing an identical record is a no-op.
    ///
    /// # Errors
    ///
    /// [`FrwError::StorageError`] if the id or public key is already in
    /// use by a different record.
    pub fn import_record(&self, record: VaultRecord) -> Result<String> {
        let _guard = self.lock_writer();
        let mut state = self.load_or_empty_locked()?;

        if let Some(existing) = state.record(&record.id) {
            if *existing == record {
                return Ok(record.id);
            }
            return Err(FrwError::StorageError {
                reason: format!("record id '{}' already in use", record.id),
            });
        }
        if state.record_by_public_key(&record.public_key).is_some() {
            return Err(FrwError::StorageError {
                reason: "public key already present under another id".into(),
            });
        }

        let id = record.id.clone();
        state.vault.push(record);
        state.validate()?;
        self.persist(&state)?;

        tracing::info!(id = %id, "imported vault record");
        Ok(id)
    }

    /// Removes local records whose public key belongs to one of the given
    /// on-chain key indexes.
    ///
    /// Advisory: the chain is the source of truth for revocation, this
    /// only stops the wallet offering dead keys.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    pub fn revoke_local_records_for_indexes(
        &self,
        indexes: &[u32],
        account_keys: &[AccountKeyDescriptor],
    ) -> Result<usize> {
        let revoked: Vec<&AccountKeyDescriptor> = account_keys
            .iter()
            .filter(|k| indexes.contains(&k.index))
            .collect();
        if revoked.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock_writer();
        let mut state = self.load_locked()?;

        let before = state.vault.len();
        state
            .vault
            .retain(|r| !revoked.iter().any(|k| k.matches_public_key(&r.public_key)));
        let removed = before - state.vault.len();

        if removed > 0 {
            self.persist(&state)?;
            tracing::info!(removed, ?indexes, "removed revoked keys from local vault");
        }
        Ok(removed)
    }

    /// Returns the current-key pointer, if one has been set.
    pub fn current_pointer(&self) -> Result<Option<CurrentPointer>> {
        let raw = match self.storage.get(CURRENT_ID_KEY)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| FrwError::StorageError {
                reason: format!("malformed current key pointer: {e}"),
            })
    }

    /// Points the wallet at record `id`.
    ///
    /// # Errors
    ///
    /// [`FrwError::StorageError`] if no record has that id.
    pub fn set_current(&self, id: &str) -> Result<CurrentPointer> {
        let _guard = self.lock_writer();
        let state = self.load_locked()?;
        let record = state.record(id).ok_or_else(|| FrwError::StorageError {
            reason: format!("no vault record with id '{id}'"),
        })?;

        let pointer = CurrentPointer {
            id: record.id.clone(),
            public_key: record.public_key.clone(),
        };
        let json = serde_json::to_string(&pointer).map_err(|e| FrwError::StorageError {
            reason: format!("failed to serialize current key pointer: {e}"),
        })?;
        self.storage.set(CURRENT_ID_KEY, &json)?;

        tracing::debug!(id = %pointer.id, "current key pointer moved");
        Ok(pointer)
    }

    /// Records whose public key matches exactly one non-revoked on-chain key.
    pub fn usable_records(&self, account_keys: &[AccountKeyDescriptor]) -> Result<Vec<VaultRecord>> {
        let state = self.load()?;
        Ok(state
            .vault
            .into_iter()
            .filter(|r| {
                account_keys
                    .iter()
                    .filter(|k| !k.revoked && k.matches_public_key(&r.public_key))
                    .count()
                    == 1
            })
            .collect())
    }

    /// Decrypts the secret of record `id`.
    ///
    /// # Errors
    ///
    /// - [`FrwError::StorageError`] if no record has that id.
    /// - [`FrwError::WrongPassphrase`] if the cipher rejects the passphrase.
    pub fn decrypt_secret(
        &self,
        id: &str,
        cipher: &dyn VaultCipher,
        passphrase: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let state = self.load()?;
        let record = state.record(id).ok_or_else(|| FrwError::StorageError {
            reason: format!("no vault record with id '{id}'"),
        })?;
        cipher.decrypt(&record.encrypted_secret, passphrase)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    /// The mutex only orders writers; the state lives in storage, so a
    /// panic in another writer leaves nothing to repair here.
    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller must hold the writer lock.
    fn load_locked(&self) -> Result<KeyringStateV3> {
        if let Some(raw) = self.storage.get(KEYRING_STATE_CURRENT_KEY)? {
            let state = KeyringState::from_json(&raw)?;
            let was_current = matches!(state, KeyringState::V3(_));
            let current = migrate_to_current(state)?;
            if !was_current {
                self.persist(&current)?;
            }
            return Ok(current);
        }

        if let Some(raw) = self.storage.get(KEYRING_STATE_V2_KEY)? {
            let state = KeyringState::from_json(&raw)?;
            let from = state.version();
            let current = migrate_to_current(state)?;
            self.persist(&current)?;
            tracing::info!(from, records = current.vault.len(), "migrated keyring state");
            return Ok(current);
        }

        if self.storage.get(KEYRING_STATE_V1_KEY)?.is_some() {
            return Err(FrwError::UnsupportedVersion { version: 1 });
        }

        Err(FrwError::NoVaultFound)
    }

    fn load_or_empty_locked(&self) -> Result<KeyringStateV3> {
        match self.load_locked() {
            Err(FrwError::NoVaultFound) => Ok(KeyringStateV3::empty()),
            other => other,
        }
    }

    fn persist(&self, state: &KeyringStateV3) -> Result<()> {
        let json = serde_json::to_string(state).map_err(|e| FrwError::StorageError {
            reason: format!("failed to serialize keyring state: {e}"),
        })?;
        self.storage.set(KEYRING_STATE_CURRENT_KEY, &json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
