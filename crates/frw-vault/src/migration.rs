//! Forward-only keyring schema migration.
//!
//! Migration is pure: it takes a decoded document and returns a new one,
//! never touching storage. Each step upgrades exactly one version and
//! either maps every record or fails without a partial result.

use std::collections::HashSet;

use frw_types::{FrwError, Result, SignatureAlgorithm};

use crate::state::{KeyringState, KeyringStateV2, KeyringStateV3, VaultRecord, CURRENT_VERSION};

/// Migrates any readable keyring document to the current version.
///
/// A V3 document is validated and returned unchanged, so running this
/// on its own output is a no-op.
pub fn migrate_to_current(state: KeyringState) -> Result<KeyringStateV3> {
    let mut state = state;
    loop {
        state = match state {
            KeyringState::V3(v3) => {
                v3.validate()?;
                return Ok(v3);
            }
            KeyringState::V2(v2) => KeyringState::V3(migrate_v2_to_v3(&v2)?),
        };
    }
}

/// Maps a V2 document to V3, one record per record.
///
/// # Errors
///
/// [`FrwError::MigrationError`] if the document is not version 2, if a
/// record has an empty or duplicate id, undecodable ciphertext hex, or a
/// `signAlgo` code that names neither supported curve.
pub fn migrate_v2_to_v3(state: &KeyringStateV2) -> Result<KeyringStateV3> {
    if state.version != 2 {
        return Err(FrwError::MigrationError {
            reason: format!("expected a version 2 document, got version {}", state.version),
        });
    }

    let mut seen = HashSet::with_capacity(state.vault.len());
    let mut vault = Vec::with_capacity(state.vault.len());

    for old in &state.vault {
        if old.id.is_empty() {
            return Err(FrwError::MigrationError {
                reason: "V2 record with empty id".into(),
            });
        }
        if !seen.insert(old.id.as_str()) {
            return Err(FrwError::MigrationError {
                reason: format!("duplicate V2 record id '{}'", old.id),
            });
        }

        let signature_algorithm = match old.sign_algo {
            None => SignatureAlgorithm::P256,
            Some(code) => SignatureAlgorithm::from_chain_code(code).ok_or_else(|| {
                FrwError::MigrationError {
                    reason: format!("record '{}' has unknown signAlgo code {code}", old.id),
                }
            })?,
        };

        let encrypted_secret =
            hex::decode(frw_types::strip_hex_prefix(&old.encrypted_data)).map_err(|e| {
                FrwError::MigrationError {
                    reason: format!("record '{}' has undecodable encryptedData: {e}", old.id),
                }
            })?;

        vault.push(VaultRecord {
            id: old.id.clone(),
            public_key: old.public_key.clone(),
            signature_algorithm,
            encrypted_secret,
        });
    }

    let migrated = KeyringStateV3 {
        booted: state.booted.clone(),
        vault,
        version: CURRENT_VERSION,
    };
    migrated.validate()?;
    Ok(migrated)
}
