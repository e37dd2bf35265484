//! Unlocking a vault key.
//!
//! A record only counts as unlocked once its decrypted seed phrase has
//! been re-derived and the public key matches the one stored beside it.
//! A wrong passphrase and a corrupted record are reported differently.

use frw_crypto::mnemonic::SeedPhrase;
use frw_crypto::VaultCipher;
use frw_types::{normalize_public_key, FrwError, Result, SignatureAlgorithm};
use frw_vault::VaultStore;
use zeroize::Zeroizing;

use crate::derivation::KeyDeriver;

/// A vault key whose secret is in memory.
///
/// The seed phrase is zeroized when this is dropped.
#[derive(Debug)]
pub struct UnlockedKey {
    pub record_id: String,
    pub public_key: String,
    pub signature_algorithm: SignatureAlgorithm,
    pub seed_phrase: SeedPhrase,
}

/// Decrypts record `id` and checks it against its public key.
///
/// # Process
///
/// 1. Decrypt the record's secret with `passphrase`.
/// 2. Parse it as a seed phrase.
/// 3. Re-derive the key with the record's algorithm.
/// 4. Compare against the stored public key.
///
/// # Errors
///
/// - [`FrwError::WrongPassphrase`] if decryption fails authentication.
/// - [`FrwError::CryptoError`] if the secret is not a seed phrase or the
///   derived key does not match the record.
/// - [`FrwError::StorageError`] if no record has that id.
pub fn unlock_vault_key(
    vault: &VaultStore,
    cipher: &dyn VaultCipher,
    deriver: &dyn KeyDeriver,
    id: &str,
    passphrase: &str,
) -> Result<UnlockedKey> {
    let state = vault.load()?;
    let record = state.record(id).ok_or_else(|| FrwError::StorageError {
        reason: format!("no vault record with id '{id}'"),
    })?;

    let plaintext = cipher.decrypt(&record.encrypted_secret, passphrase)?;
    let phrase = std::str::from_utf8(&plaintext).map_err(|_| FrwError::CryptoError {
        reason: "decrypted secret is not valid UTF-8".into(),
    })?;
    let phrase = Zeroizing::new(phrase.to_owned());
    let seed_phrase = SeedPhrase::parse(&phrase).map_err(|_| FrwError::CryptoError {
        reason: format!("record '{id}' does not hold a valid seed phrase"),
    })?;

    let derived = deriver.derive_key(&seed_phrase, record.signature_algorithm)?;
    if normalize_public_key(&derived.public_key) != normalize_public_key(&record.public_key) {
        return Err(FrwError::CryptoError {
            reason: format!("decrypted key does not match public key of record '{id}'"),
        });
    }

    tracing::debug!(id, algorithm = %record.signature_algorithm, "vault key unlocked");
    Ok(UnlockedKey {
        record_id: record.id.clone(),
        public_key: record.public_key.clone(),
        signature_algorithm: record.signature_algorithm,
        seed_phrase,
    })
}
