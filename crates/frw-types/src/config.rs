//! Rotation and derivation configuration with sensible defaults.
//!
//! All operational parameters of the credential core are centralized
//! here. The configuration can be loaded from a JSON file; fields that
//! are missing fall back to their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FrwError, Result, FULL_SIGNING_WEIGHT};

/// Derivation path for chain-native (P-256) account keys.
pub const NATIVE_DERIVATION_PATH: &str = "m/44'/539'/0'/0/0";

/// Derivation path for EVM-compatible (secp256k1) account keys.
pub const EVM_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Configuration for key derivation, weak-key detection and rotation.
///
/// Example `rotation.json`:
/// ```json
/// {
///   "full_weight_threshold": 1000,
///   "seed_strength_bits": 128,
///   "detect_timeout_ms": 15000,
///   "submit_timeout_ms": 90000,
///   "legacy_public_keys": ["0x5f1b..."]
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Minimum weight for a key to count as a full signing key.
    pub full_weight_threshold: u32,

    /// Entropy of generated seed phrases: 128 (12 words) or 256 (24 words).
    pub seed_strength_bits: u32,

    /// Deadline for the account key query, in milliseconds.
    pub detect_timeout_ms: u64,

    /// Deadline for the add-and-revoke transaction, in milliseconds.
    ///
    /// Elapsing this deadline leaves the transaction outcome unknown.
    pub submit_timeout_ms: u64,

    /// Derivation path used for P-256 keys.
    pub native_derivation_path: String,

    /// Derivation path used for secp256k1 keys.
    pub evm_derivation_path: String,

    /// Public keys known to have been issued by the legacy custodial
    /// signer. Compared case-insensitively, `0x` prefix optional.
    pub legacy_public_keys: Vec<String>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            full_weight_threshold: FULL_SIGNING_WEIGHT,
            seed_strength_bits: 128,
            detect_timeout_ms: 15_000,
            submit_timeout_ms: 90_000,
            native_derivation_path: NATIVE_DERIVATION_PATH.into(),
            evm_derivation_path: EVM_DERIVATION_PATH.into(),
            legacy_public_keys: Vec::new(),
        }
    }
}

impl RotationConfig {
    /// Loads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`FrwError::ConfigError`] if the file cannot be read,
    /// is not valid JSON, or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FrwError::ConfigError {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| FrwError::ConfigError {
            reason: format!("invalid config JSON: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.full_weight_threshold == 0 || self.full_weight_threshold > FULL_SIGNING_WEIGHT {
            return Err(FrwError::ConfigError {
                reason: format!(
                    "full_weight_threshold must be 1..={FULL_SIGNING_WEIGHT}, got {}",
                    self.full_weight_threshold
                ),
            });
        }

        if !matches!(self.seed_strength_bits, 128 | 256) {
            return Err(FrwError::ConfigError {
                reason: format!(
                    "seed_strength_bits must be 128 or 256, got {}",
                    self.seed_strength_bits
                ),
            });
        }

        if self.detect_timeout_ms == 0 {
            return Err(FrwError::ConfigError {
                reason: "detect_timeout_ms must be greater than 0".into(),
            });
        }

        if self.submit_timeout_ms == 0 {
            return Err(FrwError::ConfigError {
                reason: "submit_timeout_ms must be greater than 0".into(),
            });
        }

        for (name, path) in [
            ("native_derivation_path", &self.native_derivation_path),
            ("evm_derivation_path", &self.evm_derivation_path),
        ] {
            if !path.starts_with("m/") {
                return Err(FrwError::ConfigError {
                    reason: format!("{name} must start with 'm/', got '{path}'"),
                });
            }
        }

        if self.native_derivation_path == self.evm_derivation_path {
            return Err(FrwError::ConfigError {
                reason: "native and EVM derivation paths must differ".into(),
            });
        }

        Ok(())
    }

    /// Deadline for the detection step.
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    /// Deadline for the submission step.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
