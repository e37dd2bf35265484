//! Key-value persistence backends for keyring documents.
//!
//! The vault stores a handful of JSON documents under fixed string keys.
//! Anything that can `get` and `set` a string atomically can back it.
//!
//! # File layout ([`FileStorage`])
//!
//! ```text
//! <root>/keyringStateV3.json
//! <root>/currentId.json
//! ```
//!
//! Writes are atomic: write tmp → fsync → rename. A crash at any point
//! leaves either the old file or the new one, never a mix.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use frw_types::{FrwError, Result};

// ---------------------------------------------------------------------------
// KeyValueStorage
// ---------------------------------------------------------------------------

/// String key-value store the vault persists into.
pub trait KeyValueStorage: Send + Sync {
    /// Returns the value under `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value under `key`. Must be all-or-nothing.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// In-process storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|e| FrwError::StorageError {
            reason: format!("memory storage lock poisoned: {e}"),
        })
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock_entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock_entries()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

/// One JSON file per key inside a root directory.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens (creating if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// [`FrwError::StorageError`] if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| FrwError::StorageError {
            reason: format!("failed to create storage directory {}: {e}", root.display()),
        })?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(FrwError::StorageError {
                reason: format!("invalid storage key '{key}'"),
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("value.json");
        path.with_file_name(format!(".{file_name}.tmp"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FrwError::StorageError {
                reason: format!("failed to read {}: {e}", path.display()),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp_path = Self::tmp_path(&path);

        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| FrwError::StorageError {
                reason: format!("failed to create temp file for '{key}': {e}"),
            })?;

            file.write_all(value.as_bytes())
                .map_err(|e| FrwError::StorageError {
                    reason: format!("failed to write temp file for '{key}': {e}"),
                })?;

            file.sync_all().map_err(|e| FrwError::StorageError {
                reason: format!("failed to fsync temp file for '{key}': {e}"),
            })?;
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            FrwError::StorageError {
                reason: format!("failed to rename temp file for '{key}': {e}"),
            }
        })?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
