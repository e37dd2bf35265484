//! Key lifecycle services for the wallet credential core.
//!
//! - **Derive** account keys from seed phrases ([`derivation`])
//! - **Detect** weak legacy keys on an account ([`detection`])
//! - **Rotate** them away in one on-chain transaction ([`workflow`])
//! - **Back up** the new seed phrase before rotating ([`backup`])
//! - **Unlock** a stored key and verify it ([`unlock`])
//!
//! The chain itself is reached only through the traits in [`chain`].

pub mod backup;
pub mod chain;
pub mod derivation;
pub mod detection;
pub mod guard;
pub mod unlock;
pub mod workflow;

pub use backup::{BackupFlow, BackupState};
pub use chain::{ChainQuery, TransactionSubmitter};
pub use derivation::{KeyDerivationService, KeyDeriver, NewKeyMaterial};
pub use detection::{
    BloctoDetectionResult, KeyRotationDetectionService, KnownLegacyKeys, LegacyKeyClassifier,
    WeakKeyDetector,
};
pub use guard::{AccountGuard, AccountLocks};
pub use unlock::{unlock_vault_key, UnlockedKey};
pub use workflow::{
    KeyRotationWorkflow, Notice, PendingCommit, RotationError, RotationErrorKind, RotationRequest,
    RotationResult, RotationState, UserProfile,
};
