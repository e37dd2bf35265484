//! Weak and legacy key detection.
//!
//! A key must be rotated away when it alone can sign for the account
//! (full weight) and it was issued by the legacy custodial signer.
//! Which keys count as legacy is decided by a [`LegacyKeyClassifier`].
//! Detection never writes anything and can run concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use frw_types::config::RotationConfig;
use frw_types::{normalize_public_key, AccountKeyDescriptor, FlowAddress, Result};
use serde::{Deserialize, Serialize};

use crate::chain::ChainQuery;

// ---------------------------------------------------------------------------
// LegacyKeyClassifier
// ---------------------------------------------------------------------------

/// Decides whether an on-chain key was issued by the legacy signer.
pub trait LegacyKeyClassifier: Send + Sync {
    fn is_legacy(&self, key: &AccountKeyDescriptor) -> bool;
}

impl<F> LegacyKeyClassifier for F
where
    F: Fn(&AccountKeyDescriptor) -> bool + Send + Sync,
{
    fn is_legacy(&self, key: &AccountKeyDescriptor) -> bool {
        self(key)
    }
}

/// Classifies keys by membership in a fixed set of public keys.
#[derive(Clone, Debug, Default)]
pub struct KnownLegacyKeys {
    keys: HashSet<String>,
}

impl KnownLegacyKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| normalize_public_key(k.as_ref()))
                .collect(),
        }
    }

    /// Builds the set from `legacy_public_keys` in the config.
    pub fn from_config(config: &RotationConfig) -> Self {
        Self::new(&config.legacy_public_keys)
    }
}

impl LegacyKeyClassifier for KnownLegacyKeys {
    fn is_legacy(&self, key: &AccountKeyDescriptor) -> bool {
        self.keys.contains(&normalize_public_key(&key.public_key))
    }
}

// ---------------------------------------------------------------------------
// BloctoDetectionResult
// ---------------------------------------------------------------------------

/// Outcome of inspecting one account.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloctoDetectionResult {
    /// `true` if at least one key must be rotated away.
    pub is_weak_key_present: bool,
    /// Every key on the account as read from the chain.
    pub full_account_keys: Vec<AccountKeyDescriptor>,
    /// On-chain indexes of the keys to revoke, ascending.
    pub weak_key_indexes: Vec<u32>,
}

// ---------------------------------------------------------------------------
// WeakKeyDetector
// ---------------------------------------------------------------------------

/// Detection as seen by the rotation workflow.
#[async_trait]
pub trait WeakKeyDetector: Send + Sync {
    /// Reads the account's keys and classifies them.
    async fn detect_weak_key(&self, address: &FlowAddress) -> Result<BloctoDetectionResult>;

    /// Key indexes the rotation transaction must revoke.
    fn list_revoke_indexes(&self, result: &BloctoDetectionResult) -> Vec<u32>;
}

// ---------------------------------------------------------------------------
// KeyRotationDetectionService
// ---------------------------------------------------------------------------

/// [`WeakKeyDetector`] backed by a [`ChainQuery`].
pub struct KeyRotationDetectionService {
    chain: Arc<dyn ChainQuery>,
    classifier: Arc<dyn LegacyKeyClassifier>,
    full_weight_threshold: u32,
}

impl KeyRotationDetectionService {
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        classifier: Arc<dyn LegacyKeyClassifier>,
        config: &RotationConfig,
    ) -> Self {
        Self {
            chain,
            classifier,
            full_weight_threshold: config.full_weight_threshold,
        }
    }

    /// Pure classification of an already fetched key list.
    pub fn classify(&self, keys: Vec<AccountKeyDescriptor>) -> BloctoDetectionResult {
        let mut weak_key_indexes: Vec<u32> = keys
            .iter()
            .filter(|k| {
                !k.revoked
                    && k.has_full_weight(self.full_weight_threshold)
                    && self.classifier.is_legacy(k)
            })
            .map(|k| k.index)
            .collect();
        weak_key_indexes.sort_unstable();
        weak_key_indexes.dedup();

        BloctoDetectionResult {
            is_weak_key_present: !weak_key_indexes.is_empty(),
            full_account_keys: keys,
            weak_key_indexes,
        }
    }
}

#[async_trait]
impl WeakKeyDetector for KeyRotationDetectionService {
    async fn detect_weak_key(&self, address: &FlowAddress) -> Result<BloctoDetectionResult> {
        let keys = self.chain.get_full_account_keys(address).await?;
        let result = self.classify(keys);

        tracing::debug!(
            %address,
            keys = result.full_account_keys.len(),
            weak = ?result.weak_key_indexes,
            "classified account keys"
        );
        Ok(result)
    }

    fn list_revoke_indexes(&self, result: &BloctoDetectionResult) -> Vec<u32> {
        result.weak_key_indexes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frw_types::{HashAlgorithm, SignatureAlgorithm};

    fn key(index: u32, public_key: &str, weight: u32, revoked: bool) -> AccountKeyDescriptor {
        AccountKeyDescriptor {
            index,
            public_key: public_key.into(),
            signature_algorithm: SignatureAlgorithm::P256,
            hash_algorithm: HashAlgorithm::Sha3_256,
            weight,
            revoked,
        }
    }

    struct NoChain;

    #[async_trait]
    impl ChainQuery for NoChain {
        async fn get_full_account_keys(&self, _address: &FlowAddress) -> Result<Vec<AccountKeyDescriptor>> {
            Ok(Vec::new())
        }
    }

    fn service(classifier: Arc<dyn LegacyKeyClassifier>) -> KeyRotationDetectionService {
        KeyRotationDetectionService::new(Arc::new(NoChain), classifier, &RotationConfig::default())
    }

    #[test]
    fn weak_requires_full_weight_legacy_and_live() {
        let service = service(Arc::new(KnownLegacyKeys::new(["0xAA", "bb", "cc", "dd"])));
        let result = service.classify(vec![
            key(3, "aa", 1000, false),
            key(0, "bb", 1000, false),
            key(1, "cc", 999, false),
            key(2, "dd", 1000, true),
            key(4, "ee", 1000, false),
        ]);
        assert!(result.is_weak_key_present);
        assert_eq!(result.weak_key_indexes, vec![0, 3]);
        assert_eq!(result.full_account_keys.len(), 5);
        assert_eq!(service.list_revoke_indexes(&result), vec![0, 3]);
    }

    #[test]
    fn closure_classifier() {
        let service = service(Arc::new(|k: &AccountKeyDescriptor| k.index == 1));
        let result = service.classify(vec![key(0, "aa", 1000, false), key(1, "bb", 1000, false)]);
        assert_eq!(result.weak_key_indexes, vec![1]);
    }

    #[test]
    fn nothing_weak() {
        let service = service(Arc::new(KnownLegacyKeys::default()));
        let result = service.classify(vec![key(0, "aa", 1000, false)]);
        assert!(!result.is_weak_key_present);
        assert!(result.weak_key_indexes.is_empty());
    }

    #[test]
    fn result_serializes_camel_case() -> std::result::Result<(), serde_json::Error> {
        let json = serde_json::to_string(&BloctoDetectionResult::default())?;
        assert_eq!(json, r#"{"isWeakKeyPresent":false,"fullAccountKeys":[],"weakKeyIndexes":[]}"#);
        Ok(())
    }
}
