//! Seed phrase backup flow for a new rotation key.
//!
//! The user must write down the new seed phrase before the rotation is
//! allowed to revoke the old key:
//!
//! ```text
//! ShowMnemonic → ConfirmMnemonic → Complete
//! ```
//!
//! Only a completed flow yields the [`NewKeyMaterial`] to put into a
//! [`RotationRequest`](crate::workflow::RotationRequest) with
//! `backup_confirmed = true`. The seed phrase is zeroized if the flow is
//! dropped before that.

use frw_crypto::mnemonic::SeedStrength;
use frw_types::{FrwError, NewAccountKey, Result, SignatureAlgorithm};

use crate::derivation::{KeyDeriver, NewKeyMaterial};

// ---------------------------------------------------------------------------
// BackupState
// ---------------------------------------------------------------------------

/// States of the backup flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackupState {
    /// The seed phrase is available for display.
    ShowMnemonic,
    /// User has viewed it; awaiting the words typed back.
    ConfirmMnemonic,
    /// User has typed the phrase back correctly.
    Complete,
}

// ---------------------------------------------------------------------------
// BackupFlow
// ---------------------------------------------------------------------------

/// State machine guarding a freshly generated key until it is backed up.
#[derive(Debug)]
pub struct BackupFlow {
    state: BackupState,
    material: NewKeyMaterial,
}

impl BackupFlow {
    /// Generates a new seed phrase and derives its key.
    ///
    /// # Errors
    ///
    /// Propagates seed generation and derivation failures.
    pub fn start(deriver: &dyn KeyDeriver, strength: SeedStrength, algorithm: SignatureAlgorithm) -> Result<Self> {
        let seed_phrase = deriver.generate_seed_phrase(strength)?;
        let derived_key = deriver.derive_key(&seed_phrase, algorithm)?;
        Ok(Self {
            state: BackupState::ShowMnemonic,
            material: NewKeyMaterial {
                seed_phrase,
                derived_key,
            },
        })
    }

    pub fn state(&self) -> BackupState {
        self.state
    }

    /// The key that will be added to the account.
    pub fn new_key(&self) -> &NewAccountKey {
        &self.material.derived_key
    }

    /// Returns the seed phrase for display.
    ///
    /// Only available in [`BackupState::ShowMnemonic`].
    pub fn mnemonic(&self) -> Result<&str> {
        if self.state != BackupState::ShowMnemonic {
            return Err(FrwError::CryptoError {
                reason: "seed phrase is only available in ShowMnemonic state".into(),
            });
        }
        Ok(self.material.seed_phrase.as_str())
    }

    /// Records that the user has seen the seed phrase.
    pub fn acknowledge_shown(&mut self) -> Result<()> {
        if self.state != BackupState::ShowMnemonic {
            return Err(FrwError::CryptoError {
                reason: "can only acknowledge from ShowMnemonic state".into(),
            });
        }
        self.state = BackupState::ConfirmMnemonic;
        Ok(())
    }

    /// Checks the words typed back by the user. Whitespace is normalized.
    ///
    /// A mismatch keeps the flow in `ConfirmMnemonic` so the user can try again.
    pub fn confirm(&mut self, words: &str) -> Result<()> {
        if self.state != BackupState::ConfirmMnemonic {
            return Err(FrwError::CryptoError {
                reason: "can only confirm from ConfirmMnemonic state".into(),
            });
        }

        let entered = words.split_whitespace();
        let stored = self.material.seed_phrase.as_str().split_whitespace();
        if !entered.eq(stored) {
            return Err(FrwError::CryptoError {
                reason: "confirmation words do not match the seed phrase".into(),
            });
        }

        self.state = BackupState::Complete;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.state == BackupState::Complete
    }

    /// Hands over the backed-up key material.
    ///
    /// # Errors
    ///
    /// [`FrwError::CryptoError`] unless the flow is complete.
    pub fn into_key_material(self) -> Result<NewKeyMaterial> {
        if !self.is_complete() {
            return Err(FrwError::CryptoError {
                reason: "seed phrase backup has not been confirmed".into(),
            });
        }
        Ok(self.material)
    }
}
