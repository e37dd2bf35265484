//! Persisted keyring state documents, one type per schema version.
//!
//! Each version is stored as a JSON document under its own storage key.
//! Only [`KeyringStateV3`] is ever written; older versions are read-only
//! migration sources.

use std::collections::HashSet;

use frw_types::{FrwError, Result, SignatureAlgorithm};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Storage keys
// ---------------------------------------------------------------------------

/// Storage key of the original, single-curve keyring format.
pub const KEYRING_STATE_V1_KEY: &str = "keyringState";

/// Storage key of the V2 keyring format.
pub const KEYRING_STATE_V2_KEY: &str = "keyringStateV2";

/// Storage key of the V3 keyring format.
pub const KEYRING_STATE_V3_KEY: &str = "keyringStateV3";

/// Storage key the current schema version is written under.
pub const KEYRING_STATE_CURRENT_KEY: &str = KEYRING_STATE_V3_KEY;

/// Storage key of the current-key pointer.
pub const CURRENT_ID_KEY: &str = "currentId";

/// Newest schema version this build reads and writes.
pub const CURRENT_VERSION: u32 = 3;

// ---------------------------------------------------------------------------
// V2
// ---------------------------------------------------------------------------

/// Vault record as written by V2 builds.
///
/// There is no explicit curve field. `sign_algo` carries the chain's
/// numeric algorithm code when present; records created before
/// multi-curve support omit it and are P-256.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecordV2 {
    pub id: String,
    pub public_key: String,
    /// Hex-encoded ciphertext.
    pub encrypted_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_algo: Option<u32>,
}

/// V2 keyring document.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyringStateV2 {
    pub booted: String,
    pub vault: Vec<VaultRecordV2>,
    pub version: u32,
}

// ---------------------------------------------------------------------------
// V3
// ---------------------------------------------------------------------------

/// One signing key the user owns.
///
/// `encrypted_secret` holds the seed phrase sealed by a
/// [`VaultCipher`](frw_crypto::VaultCipher). It is hex-encoded in JSON.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    /// Identifier, unique within the vault.
    pub id: String,
    /// Hex public key (uncompressed, no SEC1 tag).
    pub public_key: String,
    /// Curve the key was derived on.
    pub signature_algorithm: SignatureAlgorithm,
    /// Encrypted seed phrase.
    #[serde(with = "hex_bytes")]
    pub encrypted_secret: Vec<u8>,
}

/// Current keyring document.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyringStateV3 {
    /// Opaque marker carried over unchanged from earlier versions.
    pub booted: String,
    pub vault: Vec<VaultRecord>,
    pub version: u32,
}

impl KeyringStateV3 {
    /// An empty vault, used when the first record is imported on a fresh install.
    pub fn empty() -> Self {
        Self {
            booted: String::new(),
            vault: Vec::new(),
            version: CURRENT_VERSION,
        }
    }

    /// Looks up a record by id.
    pub fn record(&self, id: &str) -> Option<&VaultRecord> {
        self.vault.iter().find(|r| r.id == id)
    }

    /// Looks up a record by public key (case and `0x` prefix ignored).
    pub fn record_by_public_key(&self, public_key: &str) -> Option<&VaultRecord> {
        let wanted = frw_types::normalize_public_key(public_key);
        self.vault
            .iter()
            .find(|r| frw_types::normalize_public_key(&r.public_key) == wanted)
    }

    /// Checks the structural invariants of a V3 document.
    ///
    /// # Errors
    ///
    /// - [`FrwError::UnsupportedVersion`] if `version` is not 3.
    /// - [`FrwError::StorageError`] on an empty or duplicate id or an
    ///   empty public key.
    pub fn validate(&self) -> Result<()> {
        if self.version != CURRENT_VERSION {
            return Err(FrwError::UnsupportedVersion {
                version: self.version,
            });
        }

        let mut ids = HashSet::with_capacity(self.vault.len());
        for record in &self.vault {
            if record.id.is_empty() {
                return Err(FrwError::StorageError {
                    reason: "vault record with empty id".into(),
                });
            }
            if !ids.insert(record.id.as_str()) {
                return Err(FrwError::StorageError {
                    reason: format!("duplicate vault record id '{}'", record.id),
                });
            }
            if frw_types::strip_hex_prefix(&record.public_key).is_empty() {
                return Err(FrwError::StorageError {
                    reason: format!("vault record '{}' has no public key", record.id),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyringState
// ---------------------------------------------------------------------------

/// Any keyring document this build can read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyringState {
    V2(KeyringStateV2),
    V3(KeyringStateV3),
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl KeyringState {
    /// Decodes a stored JSON document, dispatching on its `version` field.
    ///
    /// # Errors
    ///
    /// - [`FrwError::StorageError`] if the JSON is malformed.
    /// - [`FrwError::UnsupportedVersion`] for any version other than 2 or 3.
    pub fn from_json(raw: &str) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_str(raw).map_err(|e| FrwError::StorageError {
            reason: format!("keyring document has no readable version: {e}"),
        })?;

        match probe.version {
            2 => serde_json::from_str(raw)
                .map(Self::V2)
                .map_err(|e| FrwError::StorageError {
                    reason: format!("malformed V2 keyring document: {e}"),
                }),
            3 => serde_json::from_str(raw)
                .map(Self::V3)
                .map_err(|e| FrwError::StorageError {
                    reason: format!("malformed V3 keyring document: {e}"),
                }),
            version => Err(FrwError::UnsupportedVersion { version }),
        }
    }

    /// Schema version of the document.
    pub fn version(&self) -> u32 {
        match self {
            Self::V2(_) => 2,
            Self::V3(_) => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Current pointer
// ---------------------------------------------------------------------------

/// Which vault record is the active signing key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPointer {
    pub id: String,
    pub public_key: String,
}

// ---------------------------------------------------------------------------
// Hex serde helper
// ---------------------------------------------------------------------------

/// `#[serde(with = "...")]` codec storing bytes as a hex string.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, public_key: &str) -> VaultRecord {
        VaultRecord {
            id: id.into(),
            public_key: public_key.into(),
            signature_algorithm: SignatureAlgorithm::P256,
            encrypted_secret: vec![1, 2, 3],
        }
    }

    #[test]
    fn v3_json_shape() -> Result<()> {
        let mut state = KeyringStateV3::empty();
        state.vault.push(record("a", "abcd"));
        let json = serde_json::to_string(&state).map_err(|e| FrwError::StorageError {
            reason: e.to_string(),
        })?;
        assert!(json.contains(r#""publicKey":"abcd""#));
        assert!(json.contains(r#""signatureAlgorithm":"P256""#));
        assert!(json.contains(r#""encryptedSecret":"010203""#));
        assert_eq!(KeyringState::from_json(&json)?, KeyringState::V3(state));
        Ok(())
    }

    #[test]
    fn v2_sign_algo_is_optional() -> Result<()> {
        let raw = r#"{"booted":"x","version":2,"vault":[
            {"id":"1","publicKey":"aa","encryptedData":"00"},
            {"id":"2","publicKey":"bb","encryptedData":"01","signAlgo":3}
        ]}"#;
        let KeyringState::V2(state) = KeyringState::from_json(raw)? else {
            return Err(FrwError::StorageError {
                reason: "expected V2".into(),
            });
        };
        assert_eq!(state.vault[0].sign_algo, None);
        assert_eq!(state.vault[1].sign_algo, Some(3));
        Ok(())
    }

    #[test]
    fn unknown_version_rejected() {
        let result = KeyringState::from_json(r#"{"booted":"","vault":[],"version":7}"#);
        assert!(matches!(result, Err(FrwError::UnsupportedVersion { version: 7 })));
    }

    #[test]
    fn duplicate_ids_fail_validation() {
        let mut state = KeyringStateV3::empty();
        state.vault.push(record("a", "aa"));
        state.vault.push(record("a", "bb"));
        assert!(matches!(state.validate(), Err(FrwError::StorageError { .. })));
    }

    #[test]
    fn lookup_by_public_key_ignores_prefix() {
        let mut state = KeyringStateV3::empty();
        state.vault.push(record("a", "ABCD"));
        assert_eq!(state.record_by_public_key("0xabcd").map(|r| r.id.as_str()), Some("a"));
        assert!(state.record("b").is_none());
    }
}
