//! Key rotation workflow.
//!
//! Replaces every weak key on an account with one freshly derived key in
//! a single add-and-revoke transaction, then records the new key in the
//! local vault.
//!
//! ```text
//! Validating → Detecting ─┬─→ FastFail
//!                         └─→ Deriving → Submitting → Persisting → Done
//!
//! any non-terminal state ──→ Failed(kind)
//! ```
//!
//! The workflow never panics or returns an error past [`execute`]: every
//! outcome, including a panicking collaborator, becomes a
//! [`RotationResult`]. Submission is attempted at most once per call. A
//! submit timeout leaves the on-chain outcome unknown and is reported as
//! such instead of being retried.
//!
//! Once the transaction is sealed the new key's sealed secret exists
//! nowhere but in memory. If persisting it fails, the result carries it
//! as a [`PendingCommit`] to hand to
//! [`retry_persistence`](KeyRotationWorkflow::retry_persistence).
//!
//! [`execute`]: KeyRotationWorkflow::execute

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use frw_crypto::mnemonic::SeedStrength;
use frw_crypto::VaultCipher;
use frw_types::config::RotationConfig;
use frw_types::{FlowAddress, FrwError, NewAccountKey, SignatureAlgorithm};
use frw_vault::VaultStore;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::chain::TransactionSubmitter;
use crate::derivation::{KeyDeriver, NewKeyMaterial};
use crate::detection::WeakKeyDetector;
use crate::guard::AccountLocks;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Caller-facing failure classes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationErrorKind {
    /// A precondition failed or rotation is not needed. Nothing happened.
    ValidationFailed,
    /// No seed phrase could be generated.
    SeedGenerationFailed,
    /// The new key could not be derived or its secret not sealed.
    KeyDerivationFailed,
    /// The add-and-revoke transaction failed or its outcome is unknown.
    CadenceTransactionFailed,
    /// The chain was updated but the local vault was not.
    StorageUpdateFailed,
    /// Weak keys were reported but none has a revocable index.
    NotNeedRotate,
    /// Anything else.
    Unknown,
}

impl RotationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::SeedGenerationFailed => "SEED_GENERATION_FAILED",
            Self::KeyDerivationFailed => "KEY_DERIVATION_FAILED",
            Self::CadenceTransactionFailed => "CADENCE_TRANSACTION_FAILED",
            Self::StorageUpdateFailed => "STORAGE_UPDATE_FAILED",
            Self::NotNeedRotate => "NOT_NEED_ROTATE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RotationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failure should be surfaced to the user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Notice {
    /// Nothing went wrong from the user's point of view.
    Informational,
    /// The account changed but the app must be told; no funds at risk.
    UrgentNonDestructive,
    Error,
}

/// One failure reported by a rotation attempt.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationError {
    pub kind: RotationErrorKind,
    pub message: String,
    /// Set when the transaction may or may not have been sealed.
    #[serde(default)]
    pub unknown_outcome: bool,
    /// An `UNKNOWN` failure that happened before anything was sent to
    /// the chain, e.g. an unreachable access node during detection.
    #[serde(default)]
    pub retry_safe: bool,
}

impl RotationError {
    pub fn new(kind: RotationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            unknown_outcome: false,
            retry_safe: false,
        }
    }

    /// Detection failed or timed out. Nothing was submitted.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self {
            retry_safe: true,
            ..Self::new(RotationErrorKind::Unknown, message)
        }
    }

    /// A submission whose result never came back.
    pub fn unknown_outcome(message: impl Into<String>) -> Self {
        Self {
            kind: RotationErrorKind::CadenceTransactionFailed,
            message: message.into(),
            unknown_outcome: true,
            retry_safe: false,
        }
    }

    /// Whether the whole rotation may be attempted again as is.
    ///
    /// A transaction with unknown outcome is not retryable: the account
    /// must be re-read first, or the same keys could be revoked twice.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            RotationErrorKind::SeedGenerationFailed | RotationErrorKind::KeyDerivationFailed => true,
            RotationErrorKind::CadenceTransactionFailed => !self.unknown_outcome,
            RotationErrorKind::Unknown => self.retry_safe,
            RotationErrorKind::ValidationFailed
            | RotationErrorKind::StorageUpdateFailed
            | RotationErrorKind::NotNeedRotate => false,
        }
    }

    /// Whether only the local persistence step should be retried.
    pub fn is_persistence_only(&self) -> bool {
        self.kind == RotationErrorKind::StorageUpdateFailed
    }

    pub fn notice(&self) -> Notice {
        match self.kind {
            RotationErrorKind::ValidationFailed | RotationErrorKind::NotNeedRotate => Notice::Informational,
            RotationErrorKind::StorageUpdateFailed => Notice::UrgentNonDestructive,
            _ => Notice::Error,
        }
    }
}

impl fmt::Display for RotationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if self.unknown_outcome {
            write!(f, " (outcome unknown)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// A sealed key whose transaction went through but which is not yet in
/// the vault.
///
/// `encrypted_secret` is the vault ciphertext of the new seed phrase, so
/// this can be stored or logged like any other vault record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCommit {
    pub key: NewAccountKey,
    #[serde(with = "frw_vault::state::hex_bytes")]
    pub encrypted_secret: Vec<u8>,
}

/// Outcome of one rotation attempt.
///
/// `success` means the rotation transaction was sealed on chain. It can
/// be `true` together with an error when a later local step failed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    pub errors: Vec<RotationError>,
    /// Present when the transaction was sealed but the new key did not
    /// reach the vault.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_commit: Option<PendingCommit>,
}

impl RotationResult {
    fn completed(tx_id: String) -> Self {
        Self {
            success: true,
            tx_id: Some(tx_id),
            errors: Vec::new(),
            pending_commit: None,
        }
    }

    fn failed(error: RotationError, tx_id: Option<String>) -> Self {
        Self {
            success: tx_id.is_some(),
            tx_id,
            errors: vec![error],
            pending_commit: None,
        }
    }

    pub fn first_error(&self) -> Option<&RotationError> {
        self.errors.first()
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserProfile {
    pub primary_address: FlowAddress,
}

/// Input to [`KeyRotationWorkflow::execute`].
pub struct RotationRequest {
    pub user_profile: UserProfile,
    /// The user confirmed the seed phrase of the new key was written down.
    pub backup_confirmed: bool,
    /// Key prepared by the backup flow. Generated on the fly if absent.
    pub new_key: Option<NewKeyMaterial>,
    /// Vault passphrase the new seed phrase is sealed under.
    pub passphrase: Zeroizing<String>,
    /// Curve of a generated key. Ignored when `new_key` is set.
    pub algorithm: SignatureAlgorithm,
    /// Overrides the configured detection deadline.
    pub detect_timeout: Option<Duration>,
    /// Overrides the configured submission deadline.
    pub submit_timeout: Option<Duration>,
}

impl RotationRequest {
    pub fn new(primary_address: FlowAddress, passphrase: impl Into<String>) -> Self {
        Self {
            user_profile: UserProfile { primary_address },
            backup_confirmed: false,
            new_key: None,
            passphrase: Zeroizing::new(passphrase.into()),
            algorithm: SignatureAlgorithm::P256,
            detect_timeout: None,
            submit_timeout: None,
        }
    }

    pub fn with_backup_confirmed(mut self, confirmed: bool) -> Self {
        self.backup_confirmed = confirmed;
        self
    }

    pub fn with_new_key(mut self, material: NewKeyMaterial) -> Self {
        self.new_key = Some(material);
        self
    }

    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = Some(timeout);
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for RotationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationRequest")
            .field("user_profile", &self.user_profile)
            .field("backup_confirmed", &self.backup_confirmed)
            .field("new_key", &self.new_key)
            .field("passphrase", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("detect_timeout", &self.detect_timeout)
            .field("submit_timeout", &self.submit_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RotationState {
    Validating,
    Detecting,
    FastFail,
    Deriving,
    Submitting,
    Persisting,
    Done,
    Failed(RotationErrorKind),
}

impl RotationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(&self, next: &RotationState) -> bool {
        use RotationState::*;
        match (self, next) {
            (from, Failed(_)) => !from.is_terminal(),
            (Validating, Detecting)
            | (Detecting, FastFail)
            | (Detecting, Deriving)
            | (Deriving, Submitting)
            | (Submitting, Persisting)
            | (Persisting, Done) => true,
            _ => false,
        }
    }
}

/// Progress of one `execute` call.
struct RotationRun {
    address: FlowAddress,
    state: RotationState,
    tx_id: Option<String>,
    pending: Option<PendingCommit>,
}

impl RotationRun {
    fn new(address: FlowAddress) -> Self {
        Self {
            address,
            state: RotationState::Validating,
            tx_id: None,
            pending: None,
        }
    }

    fn advance(&mut self, next: RotationState) -> Result<(), RotationError> {
        if !self.state.can_advance_to(&next) {
            return Err(RotationError::new(
                RotationErrorKind::Unknown,
                format!("illegal rotation transition {:?} -> {:?}", self.state, next),
            ));
        }
        tracing::debug!(address = %self.address, from = ?self.state, to = ?next, "rotation state");
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, kind: RotationErrorKind) {
        if !self.state.is_terminal() {
            self.state = RotationState::Failed(kind);
        }
    }
}

// ---------------------------------------------------------------------------
// KeyRotationWorkflow
// ---------------------------------------------------------------------------

/// Orchestrates detection, derivation, submission and persistence.
pub struct KeyRotationWorkflow {
    detector: Arc<dyn WeakKeyDetector>,
    deriver: Arc<dyn KeyDeriver>,
    submitter: Arc<dyn TransactionSubmitter>,
    vault: Arc<VaultStore>,
    cipher: Arc<dyn VaultCipher>,
    config: RotationConfig,
    locks: AccountLocks,
}

impl KeyRotationWorkflow {
    pub fn new(
        detector: Arc<dyn WeakKeyDetector>,
        deriver: Arc<dyn KeyDeriver>,
        submitter: Arc<dyn TransactionSubmitter>,
        vault: Arc<VaultStore>,
        cipher: Arc<dyn VaultCipher>,
        config: RotationConfig,
    ) -> Self {
        Self {
            detector,
            deriver,
            submitter,
            vault,
            cipher,
            config,
            locks: AccountLocks::new(),
        }
    }

    /// Shares an existing lock registry, e.g. between workflow instances
    /// serving the same accounts.
    pub fn with_locks(mut self, locks: AccountLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    /// Runs one rotation attempt.
    pub async fn execute(&self, request: RotationRequest) -> RotationResult {
        let address = request.user_profile.primary_address;
        let mut run = RotationRun::new(address);

        let outcome = AssertUnwindSafe(self.drive(request, &mut run))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(tx_id)) => {
                tracing::info!(%address, %tx_id, "key rotation complete");
                return RotationResult::completed(tx_id);
            }
            Ok(Err(error)) => error,
            Err(panic) => RotationError::new(
                RotationErrorKind::Unknown,
                format!("rotation step panicked: {}", panic_message(panic.as_ref())),
            ),
        };

        let failed_in = run.state;
        run.fail(error.kind);
        match error.notice() {
            Notice::Informational => {
                tracing::info!(%address, kind = %error.kind, message = %error.message, "rotation not performed");
            }
            Notice::UrgentNonDestructive => {
                tracing::warn!(
                    %address,
                    tx_id = ?run.tx_id,
                    message = %error.message,
                    "rotation sealed on chain but local vault not updated"
                );
            }
            Notice::Error if error.kind == RotationErrorKind::Unknown => {
                tracing::error!(
                    %address,
                    state = ?failed_in,
                    tx_id = ?run.tx_id,
                    message = %error.message,
                    "rotation failed unexpectedly"
                );
            }
            Notice::Error => {
                tracing::warn!(
                    %address,
                    state = ?failed_in,
                    kind = %error.kind,
                    unknown_outcome = error.unknown_outcome,
                    message = %error.message,
                    "rotation failed"
                );
            }
        }

        RotationResult {
            pending_commit: run.pending.take(),
            ..RotationResult::failed(error, run.tx_id)
        }
    }

    /// Like [`execute`](Self::execute), but rejects the request with
    /// `VALIDATION_FAILED` if the account already has a rotation in flight.
    pub async fn execute_exclusive(&self, request: RotationRequest) -> RotationResult {
        let address = request.user_profile.primary_address;
        let _guard = match self.locks.try_acquire(address) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::info!(%address, "{e}");
                return RotationResult::failed(
                    RotationError::new(RotationErrorKind::ValidationFailed, e.to_string()),
                    None,
                );
            }
        };
        self.execute(request).await
    }

    async fn drive(&self, request: RotationRequest, run: &mut RotationRun) -> Result<String, RotationError> {
        let RotationRequest {
            user_profile,
            backup_confirmed,
            new_key,
            passphrase,
            algorithm,
            detect_timeout,
            submit_timeout,
        } = request;
        let address = user_profile.primary_address;

        // Validating: no network before the user has secured the new seed phrase.
        if !backup_confirmed {
            return Err(RotationError::new(
                RotationErrorKind::ValidationFailed,
                "seed phrase backup has not been confirmed",
            ));
        }
        if passphrase.is_empty() {
            return Err(RotationError::new(
                RotationErrorKind::ValidationFailed,
                "a vault passphrase is required",
            ));
        }

        run.advance(RotationState::Detecting)?;
        let detect_timeout = detect_timeout.unwrap_or_else(|| self.config.detect_timeout());
        let detection = match tokio::time::timeout(detect_timeout, self.detector.detect_weak_key(&address)).await {
            Ok(Ok(detection)) => detection,
            Ok(Err(e)) => {
                return Err(RotationError::detection_failed(format!(
                    "weak key detection failed: {e}"
                )))
            }
            Err(_) => {
                return Err(RotationError::detection_failed(
                    timeout_error("weak key detection", detect_timeout).to_string(),
                ))
            }
        };

        if !detection.is_weak_key_present {
            run.advance(RotationState::FastFail)?;
            return Err(RotationError::new(
                RotationErrorKind::ValidationFailed,
                "rotation not needed",
            ));
        }
        let revoke_indexes = self.detector.list_revoke_indexes(&detection);
        if revoke_indexes.is_empty() {
            return Err(RotationError::new(
                RotationErrorKind::NotNeedRotate,
                "weak key reported without a revocable index",
            ));
        }

        run.advance(RotationState::Deriving)?;
        let material = match new_key {
            Some(material) => material,
            None => self.generate_material(algorithm)?,
        };
        let encrypted_secret = self
            .cipher
            .encrypt(material.seed_phrase.as_str().as_bytes(), &passphrase)
            .map_err(|e| {
                RotationError::new(
                    RotationErrorKind::KeyDerivationFailed,
                    format!("failed to seal new seed phrase: {e}"),
                )
            })?;

        run.advance(RotationState::Submitting)?;
        let new_public_keys = vec![material.derived_key.bare_public_key().to_owned()];
        let submit_timeout = submit_timeout.unwrap_or_else(|| self.config.submit_timeout());
        let submission = tokio::time::timeout(
            submit_timeout,
            self.submitter.add_and_revoke_keys(&new_public_keys, &revoke_indexes),
        )
        .await;
        let tx_id = match submission {
            Ok(Ok(tx_id)) => tx_id,
            Ok(Err(e)) => {
                return Err(RotationError::new(
                    RotationErrorKind::CadenceTransactionFailed,
                    format!("add-and-revoke transaction failed: {e}"),
                ))
            }
            Err(_) => {
                return Err(RotationError::unknown_outcome(format!(
                    "{}; re-read the account keys before trying again",
                    timeout_error("add-and-revoke transaction", submit_timeout)
                )))
            }
        };
        run.tx_id = Some(tx_id.clone());
        tracing::info!(%address, %tx_id, revoked = ?revoke_indexes, "rotation transaction sealed");

        run.advance(RotationState::Persisting)?;
        let pending = run.pending.insert(PendingCommit {
            key: material.derived_key.clone(),
            encrypted_secret,
        });
        self.commit_pending(pending)?;
        run.pending = None;

        if let Err(e) = self
            .vault
            .revoke_local_records_for_indexes(&revoke_indexes, &detection.full_account_keys)
        {
            tracing::warn!(%address, %e, "could not remove revoked keys from local vault");
        }

        run.advance(RotationState::Done)?;
        Ok(tx_id)
    }

    /// Stores a key left behind by a rotation whose transaction was
    /// sealed but whose persistence failed, and makes it current.
    ///
    /// Never touches the chain. Safe to call again after another failure:
    /// a key already in the vault is not duplicated.
    ///
    /// # Returns
    ///
    /// The vault record id of the key.
    ///
    /// # Errors
    ///
    /// `STORAGE_UPDATE_FAILED` if the vault still cannot be written.
    pub fn retry_persistence(&self, pending: &PendingCommit) -> Result<String, RotationError> {
        let record_id = self.commit_pending(pending)?;
        tracing::info!(id = %record_id, "pending rotation key persisted");
        Ok(record_id)
    }

    fn commit_pending(&self, pending: &PendingCommit) -> Result<String, RotationError> {
        let record_id = self
            .vault
            .commit_new_key(&pending.key, pending.encrypted_secret.clone())
            .map_err(|e| storage_failed("failed to store new key", e))?;
        self.vault
            .set_current(&record_id)
            .map_err(|e| storage_failed("failed to select new key", e))?;
        Ok(record_id)
    }

    fn generate_material(&self, algorithm: SignatureAlgorithm) -> Result<NewKeyMaterial, RotationError> {
        let strength = SeedStrength::try_from(self.config.seed_strength_bits).map_err(|e| {
            RotationError::new(RotationErrorKind::SeedGenerationFailed, e.to_string())
        })?;
        let seed_phrase = self.deriver.generate_seed_phrase(strength).map_err(|e| {
            RotationError::new(
                RotationErrorKind::SeedGenerationFailed,
                format!("failed to generate seed phrase: {e}"),
            )
        })?;
        let derived_key = self.deriver.derive_key(&seed_phrase, algorithm).map_err(|e| {
            RotationError::new(
                RotationErrorKind::KeyDerivationFailed,
                format!("failed to derive {algorithm} key: {e}"),
            )
        })?;
        Ok(NewKeyMaterial {
            seed_phrase,
            derived_key,
        })
    }
}

fn timeout_error(operation: &str, after: Duration) -> FrwError {
    FrwError::Timeout {
        operation: operation.into(),
        millis: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
    }
}

fn storage_failed(context: &str, e: FrwError) -> RotationError {
    RotationError::new(RotationErrorKind::StorageUpdateFailed, format!("{context}: {e}"))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
