//! Seed phrase generation and account key derivation.
//!
//! The derivation path is fixed per curve:
//!
//! | Algorithm   | Curve       | Path                 |
//! |-------------|-------------|----------------------|
//! | `P256`      | `nist256p1` | `m/44'/539'/0'/0/0`  |
//! | `SECP256K1` | `secp256k1` | `m/44'/60'/0'/0/0`   |
//!
//! Both paths are configurable through [`RotationConfig`].

use std::sync::Arc;

use frw_crypto::hd_derive::{derive_public_key, Curve};
use frw_crypto::mnemonic::{generate_seed_phrase, EntropySource, OsEntropy, SeedPhrase, SeedStrength};
use frw_types::config::RotationConfig;
use frw_types::{NewAccountKey, Result, SignatureAlgorithm, FULL_SIGNING_WEIGHT};

// ---------------------------------------------------------------------------
// NewKeyMaterial
// ---------------------------------------------------------------------------

/// A fresh seed phrase together with the account key derived from it.
///
/// Lives in memory only. The seed phrase is zeroized when this is dropped.
#[derive(Debug)]
pub struct NewKeyMaterial {
    pub seed_phrase: SeedPhrase,
    pub derived_key: NewAccountKey,
}

// ---------------------------------------------------------------------------
// KeyDeriver
// ---------------------------------------------------------------------------

/// Generates seed phrases and derives account keys from them.
pub trait KeyDeriver: Send + Sync {
    /// Generates a new seed phrase from the CSPRNG.
    ///
    /// # Errors
    ///
    /// [`FrwError::EntropySourceUnavailable`](frw_types::FrwError::EntropySourceUnavailable)
    /// if no secure randomness is available.
    fn generate_seed_phrase(&self, strength: SeedStrength) -> Result<SeedPhrase>;

    /// Derives the account key for `algorithm`. Deterministic.
    fn derive_key(&self, seed_phrase: &SeedPhrase, algorithm: SignatureAlgorithm) -> Result<NewAccountKey>;
}

// ---------------------------------------------------------------------------
// KeyDerivationService
// ---------------------------------------------------------------------------

/// SLIP-0010 based [`KeyDeriver`].
#[derive(Clone)]
pub struct KeyDerivationService {
    entropy: Arc<dyn EntropySource>,
    native_path: String,
    evm_path: String,
}

impl KeyDerivationService {
    /// Uses the OS CSPRNG and the configured derivation paths.
    pub fn new(config: &RotationConfig) -> Self {
        Self::with_entropy(config, Arc::new(OsEntropy))
    }

    /// Uses a caller-supplied entropy source.
    pub fn with_entropy(config: &RotationConfig, entropy: Arc<dyn EntropySource>) -> Self {
        Self {
            entropy,
            native_path: config.native_derivation_path.clone(),
            evm_path: config.evm_derivation_path.clone(),
        }
    }

    /// Derivation path used for `algorithm`.
    pub fn derivation_path(&self, algorithm: SignatureAlgorithm) -> &str {
        match algorithm {
            SignatureAlgorithm::P256 => &self.native_path,
            SignatureAlgorithm::Secp256k1 => &self.evm_path,
        }
    }

    /// Generates a seed phrase and derives its key in one step.
    pub fn generate_key_material(&self, strength: SeedStrength, algorithm: SignatureAlgorithm) -> Result<NewKeyMaterial> {
        let seed_phrase = self.generate_seed_phrase(strength)?;
        let derived_key = self.derive_key(&seed_phrase, algorithm)?;
        Ok(NewKeyMaterial {
            seed_phrase,
            derived_key,
        })
    }
}

impl KeyDeriver for KeyDerivationService {
    fn generate_seed_phrase(&self, strength: SeedStrength) -> Result<SeedPhrase> {
        generate_seed_phrase(strength, self.entropy.as_ref())
    }

    fn derive_key(&self, seed_phrase: &SeedPhrase, algorithm: SignatureAlgorithm) -> Result<NewAccountKey> {
        let curve = match algorithm {
            SignatureAlgorithm::P256 => Curve::Nist256p1,
            SignatureAlgorithm::Secp256k1 => Curve::Secp256k1,
        };
        let seed = seed_phrase.to_seed()?;
        let public_key = derive_public_key(&seed, curve, self.derivation_path(algorithm))?;

        Ok(NewAccountKey {
            public_key: public_key.to_hex(),
            signature_algorithm: algorithm,
            hash_algorithm: algorithm.default_hash_algorithm(),
            weight: FULL_SIGNING_WEIGHT,
        })
    }
}
