//! Passphrase encryption of vault secrets.
//!
//! The vault only talks to the [`VaultCipher`] trait. [`PassphraseCipher`]
//! is the shipped implementation: Argon2id stretches the passphrase with
//! a fresh random salt, XChaCha20-Poly1305 seals the plaintext.
//!
//! # Blob layout
//!
//! ```text
//! version (1) || salt (32) || nonce (24) || ciphertext + tag (n + 16)
//! ```
//!
//! The version byte is also bound as AAD, so it cannot be swapped
//! without failing authentication.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use frw_types::{FrwError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::kdf::{stretch_passphrase, Argon2Params};

/// Current blob format version.
pub const BLOB_VERSION: u8 = 1;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Password-based encryption used for vault record secrets.
pub trait VaultCipher: Send + Sync {
    /// Encrypts `plaintext` under `passphrase`.
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>>;

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// [`FrwError::WrongPassphrase`] if authentication fails.
    fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<Zeroizing<Vec<u8>>>;
}

/// Argon2id + XChaCha20-Poly1305 implementation of [`VaultCipher`].
#[derive(Clone, Debug, Default)]
pub struct PassphraseCipher {
    params: Argon2Params,
}

impl PassphraseCipher {
    pub fn new(params: Argon2Params) -> Self {
        Self { params }
    }

    /// Argon2 parameters used for new and existing blobs.
    pub fn params(&self) -> &Argon2Params {
        &self.params
    }

    fn aead(&self, passphrase: &str, salt: &[u8]) -> Result<XChaCha20Poly1305> {
        let key = stretch_passphrase(passphrase, salt, &self.params)?;
        Ok(XChaCha20Poly1305::new(Key::from_slice(key.as_slice())))
    }
}

impl VaultCipher for PassphraseCipher {
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        header[0] = BLOB_VERSION;
        OsRng
            .try_fill_bytes(&mut header[1..])
            .map_err(|e| FrwError::EntropySourceUnavailable {
                reason: format!("no randomness for salt and nonce: {e}"),
            })?;
        let (salt, nonce) = header[1..].split_at(SALT_LEN);

        let sealed = self
            .aead(passphrase, salt)?
            .encrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad: &[BLOB_VERSION],
                },
            )
            .map_err(|e| FrwError::CryptoError {
                reason: format!("sealing failed: {e}"),
            })?;

        let mut blob = Vec::with_capacity(HEADER_LEN + sealed.len());
        blob.extend_from_slice(&header);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < HEADER_LEN + TAG_LEN {
            return Err(FrwError::CryptoError {
                reason: format!(
                    "encrypted blob too short: {} bytes, need at least {}",
                    ciphertext.len(),
                    HEADER_LEN + TAG_LEN
                ),
            });
        }
        let (header, body) = ciphertext.split_at(HEADER_LEN);
        if header[0] != BLOB_VERSION {
            return Err(FrwError::CryptoError {
                reason: format!("unsupported blob version {}", header[0]),
            });
        }
        let (salt, nonce) = header[1..].split_at(SALT_LEN);

        // Any AEAD failure, tampering included, surfaces as a wrong passphrase.
        let plaintext = self
            .aead(passphrase, salt)?
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: &header[..1],
                },
            )
            .map_err(|_| FrwError::WrongPassphrase)?;
        Ok(Zeroizing::new(plaintext))
    }
}
