//! Passphrase stretching for vault blobs.
//!
//! Every blob carries its own random salt; the Argon2id cost settings come
//! from [`Argon2Params`] and are expected to stay fixed for the life of a
//! vault, since they are not recorded in the blob.

use frw_types::{FrwError, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Byte length of the key handed to the AEAD.
pub const VAULT_KEY_LEN: usize = 32;

/// Argon2id cost settings.
///
/// The default (64 MiB, three passes, one lane) is what shipped vaults use.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argon2Params {
    /// KiB of memory.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            m_cost: 64 * 1024,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl Argon2Params {
    /// Cheap settings for tests. Not for real vaults.
    pub const fn insecure_fast() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Checks the settings against Argon2's own limits.
    ///
    /// # Errors
    ///
    /// [`FrwError::ConfigError`] naming the rejected setting.
    pub fn validate(&self) -> Result<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(self) -> Result<argon2::Params> {
        argon2::Params::new(self.m_cost, self.t_cost, self.p_cost, Some(VAULT_KEY_LEN)).map_err(|e| {
            FrwError::ConfigError {
                reason: format!(
                    "argon2 m={} t={} p={} rejected: {e}",
                    self.m_cost, self.t_cost, self.p_cost
                ),
            }
        })
    }
}

/// Stretches `passphrase` with `salt` into a vault key.
///
/// The returned key is wiped when dropped.
pub fn stretch_passphrase(
    passphrase: &str,
    salt: &[u8],
    params: &Argon2Params,
) -> Result<Zeroizing<[u8; VAULT_KEY_LEN]>> {
    let hasher = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params.to_argon2()?,
    );

    let mut key = Zeroizing::new([0u8; VAULT_KEY_LEN]);
    hasher
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| FrwError::CryptoError {
            reason: format!("passphrase stretching failed: {e}"),
        })?;
    Ok(key)
}
