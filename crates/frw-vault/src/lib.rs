//! Versioned, encrypted key vault.
//!
//! The vault keeps one record per signing key the user owns, each with
//! its seed phrase sealed under the user's passphrase. Documents are
//! schema-versioned and migrate forward on load.
//!
//! # Modules
//!
//! - [`state`]: keyring documents per schema version
//! - [`migration`]: pure V2 → V3 migration
//! - [`storage`]: key-value backends (memory, atomic files)
//! - [`store`]: [`VaultStore`], the single writer

pub mod migration;
pub mod state;
pub mod storage;
pub mod store;

pub use state::{CurrentPointer, KeyringState, KeyringStateV2, KeyringStateV3, VaultRecord, VaultRecordV2};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::VaultStore;
