//! Core shared types for the wallet credential lifecycle core.
//!
//! Every crate in the workspace speaks in terms of the types defined
//! here: account addresses, signature/hash algorithms, on-chain key
//! descriptors and the central [`FrwError`] enum.

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Weight at which a single account key holds full signing authority.
pub const FULL_SIGNING_WEIGHT: u32 = 1000;

// ---------------------------------------------------------------------------
// FlowAddress
// ---------------------------------------------------------------------------

/// 8-byte on-chain account address.
///
/// Displayed as `0x`-prefixed lowercase hex. Parsing accepts the hex
/// form with or without the prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowAddress([u8; 8]);

impl FlowAddress {
    /// The fixed byte length of an address.
    pub const LEN: usize = 8;

    /// Creates a new `FlowAddress` from raw bytes.
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<[u8; 8]> for FlowAddress {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for FlowAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for FlowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for FlowAddress {
    type Err = FrwError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = strip_hex_prefix(s.trim());
        let bytes = hex::decode(raw).map_err(|_| FrwError::InvalidAddress {
            reason: "invalid hex encoding".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(FrwError::InvalidAddress {
                reason: format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            });
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl TryFrom<String> for FlowAddress {
    type Error = FrwError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FlowAddress> for String {
    fn from(addr: FlowAddress) -> Self {
        addr.to_string()
    }
}

// ---------------------------------------------------------------------------
// SignatureAlgorithm
// ---------------------------------------------------------------------------

/// Curve used by an account key.
///
/// `P256` is the chain-native curve; `Secp256k1` is the EVM-compatible
/// curve. The numeric codes are the ones the chain uses in its account
/// key structures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureAlgorithm {
    /// ECDSA over NIST P-256.
    P256,
    /// ECDSA over secp256k1.
    Secp256k1,
}

impl SignatureAlgorithm {
    /// On-chain numeric code (`ECDSA_P256 = 2`, `ECDSA_secp256k1 = 3`).
    pub fn chain_code(self) -> u32 {
        match self {
            Self::P256 => 2,
            Self::Secp256k1 => 3,
        }
    }

    /// Maps an on-chain numeric code back to an algorithm.
    pub fn from_chain_code(code: u32) -> Option<Self> {
        match code {
            2 => Some(Self::P256),
            3 => Some(Self::Secp256k1),
            _ => None,
        }
    }

    /// Hash algorithm paired with this curve for newly issued keys.
    pub fn default_hash_algorithm(self) -> HashAlgorithm {
        match self {
            Self::P256 => HashAlgorithm::Sha3_256,
            Self::Secp256k1 => HashAlgorithm::Sha2_256,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P256 => write!(f, "P256"),
            Self::Secp256k1 => write!(f, "SECP256K1"),
        }
    }
}

// ---------------------------------------------------------------------------
// HashAlgorithm
// ---------------------------------------------------------------------------

/// Hash algorithm an account key signs with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HashAlgorithm {
    /// SHA2-256.
    #[serde(rename = "SHA2_256")]
    Sha2_256,
    /// SHA3-256.
    #[serde(rename = "SHA3_256")]
    Sha3_256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha2_256 => write!(f, "SHA2_256"),
            Self::Sha3_256 => write!(f, "SHA3_256"),
        }
    }
}

// ---------------------------------------------------------------------------
// Key descriptors
// ---------------------------------------------------------------------------

/// Read model of one key as it exists on-chain for an account.
///
/// Not to be confused with a vault record: this is public state
/// reported by the chain, never local secret material.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKeyDescriptor {
    /// On-chain key index within the account.
    pub index: u32,
    /// Hex-encoded public key, as reported by the chain.
    pub public_key: String,
    /// Curve of the key.
    pub signature_algorithm: SignatureAlgorithm,
    /// Hash algorithm the key signs with.
    pub hash_algorithm: HashAlgorithm,
    /// Signing weight, `0..=1000`.
    pub weight: u32,
    /// Whether the key has been revoked on-chain.
    pub revoked: bool,
}

impl AccountKeyDescriptor {
    /// Returns `true` if the key alone can authorise a transaction.
    pub fn has_full_weight(&self, threshold: u32) -> bool {
        self.weight >= threshold
    }

    /// Returns `true` if `public_key` denotes the same key as this
    /// descriptor, ignoring case and any `0x` prefix.
    pub fn matches_public_key(&self, public_key: &str) -> bool {
        normalize_public_key(&self.public_key) == normalize_public_key(public_key)
    }
}

/// A freshly derived key that has not been added to any account yet.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountKey {
    /// Hex-encoded uncompressed public key (64 bytes, no SEC1 tag).
    pub public_key: String,
    /// Curve of the key.
    pub signature_algorithm: SignatureAlgorithm,
    /// Hash algorithm the key will sign with.
    pub hash_algorithm: HashAlgorithm,
    /// Weight the key is added with.
    pub weight: u32,
}

impl NewAccountKey {
    /// Public key without any `0x` prefix, as the chain expects it.
    pub fn bare_public_key(&self) -> &str {
        strip_hex_prefix(&self.public_key)
    }

    /// Builds the descriptor the key will have once added at `index`.
    pub fn at_index(&self, index: u32) -> AccountKeyDescriptor {
        AccountKeyDescriptor {
            index,
            public_key: self.public_key.clone(),
            signature_algorithm: self.signature_algorithm,
            hash_algorithm: self.hash_algorithm,
            weight: self.weight,
            revoked: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

/// Strips a leading `0x` / `0X` from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Canonical comparison form of a hex public key: no prefix, lowercase.
pub fn normalize_public_key(s: &str) -> String {
    strip_hex_prefix(s.trim()).to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// FrwError
// ---------------------------------------------------------------------------

/// Central error type for the credential lifecycle core.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum. The rotation workflow maps these onto its
/// own caller-facing taxonomy.
#[derive(Debug, Error)]
pub enum FrwError {
    /// The provided account address is malformed.
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Human-readable description of why the address is invalid.
        reason: String,
    },

    /// A cryptographic operation failed (encryption, key parsing, ...).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// Decryption failed authentication: the passphrase is wrong or the
    /// blob was tampered with.
    #[error("wrong passphrase")]
    WrongPassphrase,

    /// The platform random number generator could not supply entropy.
    #[error("entropy source unavailable: {reason}")]
    EntropySourceUnavailable {
        /// Description of the RNG failure.
        reason: String,
    },

    /// Hierarchical key derivation failed.
    #[error("key derivation error: {reason}")]
    DerivationError {
        /// Human-readable description of the derivation failure.
        reason: String,
    },

    /// No keyring state of any version is present (fresh install).
    #[error("no vault found")]
    NoVaultFound,

    /// A persisted keyring state uses a version this build cannot read.
    #[error("unsupported keyring state version {version}")]
    UnsupportedVersion {
        /// Version number found in storage.
        version: u32,
    },

    /// A schema migration could not map the old state completely.
    #[error("migration error: {reason}")]
    MigrationError {
        /// Human-readable description of the migration failure.
        reason: String,
    },

    /// A storage read, write or (de)serialization failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A chain query or transaction submission failed.
    #[error("chain error: {reason}")]
    ChainError {
        /// Human-readable description of the chain failure.
        reason: String,
    },

    /// A network step did not complete within its deadline.
    #[error("{operation} timed out after {millis} ms")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// Deadline that elapsed, in milliseconds.
        millis: u64,
    },

    /// Another rotation for the same account is still in flight.
    #[error("rotation already in progress for {address}")]
    RotationInProgress {
        /// The account being rotated.
        address: FlowAddress,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`FrwError`].
pub type Result<T> = std::result::Result<T, FrwError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
