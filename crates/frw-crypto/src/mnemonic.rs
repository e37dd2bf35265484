//! Seed phrase generation, parsing and seed derivation.
//!
//! The BIP39 wordlist encoding and the PBKDF2 seed function come from
//! the `bip39` crate. This module owns what surrounds them: where the
//! entropy comes from, which strengths are allowed, and keeping the
//! phrase and seed out of memory once they are no longer needed.
//!
//! Entropy is drawn from an [`EntropySource`]. The default source is
//! the operating system CSPRNG; if it fails, generation fails with
//! [`FrwError::EntropySourceUnavailable`]. There is no fallback.

use std::fmt;

use bip39::{Language, Mnemonic};
use frw_types::{FrwError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// ---------------------------------------------------------------------------
// SeedStrength
// ---------------------------------------------------------------------------

/// Entropy size of a generated seed phrase.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SeedStrength {
    /// 128 bits of entropy, 12 words.
    Bits128,
    /// 256 bits of entropy, 24 words.
    Bits256,
}

impl SeedStrength {
    /// Number of entropy bytes drawn for this strength.
    pub fn entropy_len(self) -> usize {
        match self {
            Self::Bits128 => 16,
            Self::Bits256 => 32,
        }
    }

    /// Number of words in a phrase of this strength.
    pub fn word_count(self) -> usize {
        match self {
            Self::Bits128 => 12,
            Self::Bits256 => 24,
        }
    }
}

impl TryFrom<u32> for SeedStrength {
    type Error = FrwError;

    fn try_from(bits: u32) -> Result<Self> {
        match bits {
            128 => Ok(Self::Bits128),
            256 => Ok(Self::Bits256),
            other => Err(FrwError::ConfigError {
                reason: format!("seed strength must be 128 or 256 bits, got {other}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// EntropySource
// ---------------------------------------------------------------------------

/// Source of cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    /// Fills `dest` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Must return [`FrwError::EntropySourceUnavailable`] rather than
    /// filling `dest` with anything weaker.
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| FrwError::EntropySourceUnavailable {
                reason: format!("OS random number generator failed: {e}"),
            })
    }
}

// ---------------------------------------------------------------------------
// SeedPhrase
// ---------------------------------------------------------------------------

/// A validated BIP39 seed phrase (normalized, single-space separated).
///
/// Zeroized on drop. `Debug` prints only the word count.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SeedPhrase(String);

impl SeedPhrase {
    /// Parses and validates a phrase (word count, wordlist, checksum).
    ///
    /// # Errors
    ///
    /// Returns [`FrwError::DerivationError`] if the phrase is not a
    /// valid English BIP39 mnemonic.
    pub fn parse(phrase: &str) -> Result<Self> {
        let mnemonic = parse_mnemonic(phrase)?;
        Ok(Self(mnemonic.to_string()))
    }

    /// Returns the phrase as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the number of words in the phrase.
    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    /// Derives the 64-byte BIP39 seed with an empty BIP39 passphrase.
    pub fn to_seed(&self) -> Result<Seed> {
        let mnemonic = parse_mnemonic(&self.0)?;
        Ok(Seed(mnemonic.to_seed("")))
    }
}

impl fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeedPhrase({} words)", self.word_count())
    }
}

impl PartialEq for SeedPhrase {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SeedPhrase {}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// A 64-byte BIP39 seed, input to hierarchical key derivation.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    /// Fixed byte length of a BIP39 seed.
    pub const LEN: usize = 64;

    /// Creates a [`Seed`] from raw bytes (test vectors, stored seeds).
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 64-byte seed.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

// Seed does not implement Clone/Debug to prevent leakage.

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generates a new random seed phrase of the given strength.
///
/// # Errors
///
/// - [`FrwError::EntropySourceUnavailable`] if `entropy` fails.
/// - [`FrwError::CryptoError`] if the entropy cannot be encoded.
pub fn generate_seed_phrase(strength: SeedStrength, entropy: &dyn EntropySource) -> Result<SeedPhrase> {
    let mut bytes = Zeroizing::new(vec![0u8; strength.entropy_len()]);
    entropy.fill(&mut bytes)?;
    entropy_to_seed_phrase(&bytes)
}

/// Encodes raw entropy (16 or 32 bytes) as a seed phrase.
///
/// Deterministic core of [`generate_seed_phrase`], exposed for test
/// vectors.
pub fn entropy_to_seed_phrase(entropy: &[u8]) -> Result<SeedPhrase> {
    if entropy.len() != 16 && entropy.len() != 32 {
        return Err(FrwError::CryptoError {
            reason: format!("entropy must be 16 or 32 bytes, got {}", entropy.len()),
        });
    }
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy).map_err(|e| {
        FrwError::CryptoError {
            reason: format!("failed to encode entropy as BIP39 mnemonic: {e}"),
        }
    })?;
    Ok(SeedPhrase(mnemonic.to_string()))
}

fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    Mnemonic::parse_in_normalized(Language::English, phrase.trim()).map_err(|e| {
        FrwError::DerivationError {
            reason: format!("invalid BIP39 seed phrase: {e}"),
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
