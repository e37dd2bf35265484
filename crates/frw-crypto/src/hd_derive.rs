//! SLIP-0010 hierarchical deterministic derivation for the two ECDSA
//! curves account keys use: NIST P-256 and secp256k1.
//!
//! # Derivation path format
//!
//! BIP-32 style paths, hardened components suffixed with `'` or `h`:
//!
//! ```text
//! m/44'/539'/0'/0/0
//! ```
//!
//! Unlike Ed25519, both curves support non-hardened children, so mixed
//! paths are accepted.
//!
//! Only the public half of the derived key leaves this module. Private
//! scalars and chain codes are zeroized as soon as the next step has
//! consumed them.
//!
//! Reference: <https://github.com/satoshilabs/slips/blob/master/slip-0010.md>

use frw_types::{FrwError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::mnemonic::Seed;

/// HMAC-SHA512 type alias used throughout SLIP-0010.
type HmacSha512 = Hmac<Sha512>;

/// The hardened index offset (0x80000000) per BIP-32/SLIP-0010.
const HARDENED_OFFSET: u32 = 0x8000_0000;

// ---------------------------------------------------------------------------
// Curve
// ---------------------------------------------------------------------------

/// Curves supported by [`derive_public_key`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Curve {
    /// NIST P-256 (`nist256p1` in SLIP-0010).
    Nist256p1,
    /// secp256k1.
    Secp256k1,
}

impl Curve {
    /// HMAC key for master key generation (SLIP-0010 §2).
    fn seed_key(self) -> &'static [u8] {
        match self {
            Self::Nist256p1 => b"Nist256p1 seed",
            Self::Secp256k1 => b"Bitcoin seed",
        }
    }

    /// `true` if `bytes` is a valid private scalar (`0 < k < n`).
    fn is_valid_secret(self, bytes: &[u8; 32]) -> bool {
        match self {
            Self::Nist256p1 => nist256p1::is_valid_secret(bytes),
            Self::Secp256k1 => secp256k1::is_valid_secret(bytes),
        }
    }

    /// `(tweak + parent) mod n`, or `None` if `tweak ≥ n` or the sum is zero.
    fn tweak_add(self, tweak: &[u8; 32], parent: &[u8; 32]) -> Option<[u8; 32]> {
        match self {
            Self::Nist256p1 => nist256p1::tweak_add(tweak, parent),
            Self::Secp256k1 => secp256k1::tweak_add(tweak, parent),
        }
    }

    /// SEC1-encoded public key for a private scalar.
    fn public_key(self, secret: &[u8; 32], compressed: bool) -> Result<Vec<u8>> {
        match self {
            Self::Nist256p1 => nist256p1::public_key(secret, compressed),
            Self::Secp256k1 => secp256k1::public_key(secret, compressed),
        }
    }
}

// ---------------------------------------------------------------------------
// DerivedPublicKey
// ---------------------------------------------------------------------------

/// Public key at the end of a derivation path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DerivedPublicKey {
    curve: Curve,
    /// Uncompressed point without the `0x04` SEC1 tag (X || Y).
    uncompressed: [u8; 64],
    /// Compressed SEC1 point.
    compressed: [u8; 33],
}

impl DerivedPublicKey {
    /// Curve the key lives on.
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Raw `X || Y` coordinates (64 bytes).
    pub fn uncompressed(&self) -> &[u8; 64] {
        &self.uncompressed
    }

    /// Compressed SEC1 encoding (33 bytes).
    pub fn compressed(&self) -> &[u8; 33] {
        &self.compressed
    }

    /// Lowercase hex of `X || Y`, the form account keys are published in.
    pub fn to_hex(&self) -> String {
        hex::encode(self.uncompressed)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Derives the public key at `path` from a BIP39 seed.
///
/// # Process (SLIP-0010 §2–§3)
///
/// 1. Master key: `HMAC-SHA512(key=curve seed key, data=seed)`, re-hashed
///    until the left half is a valid scalar.
/// 2. For each child index `i`:
///    - hardened: `data = 0x00 || k_par || ser32(i)`
///    - normal:   `data = serP(K_par) || ser32(i)`
///
///    `I = HMAC-SHA512(key=c_par, data)`, `k_i = IL + k_par (mod n)`.
///    If `IL ≥ n` or `k_i = 0`, retry with `data = 0x01 || IR || ser32(i)`.
/// 3. Encode the final private scalar's public point.
///
/// # Errors
///
/// - [`FrwError::DerivationError`] if the path is malformed.
/// - [`FrwError::CryptoError`] if HMAC or point encoding fails.
pub fn derive_public_key(seed: &Seed, curve: Curve, path: &str) -> Result<DerivedPublicKey> {
    let indices = parse_derivation_path(path)?;

    let (mut key, mut chain_code) = master_key(curve, seed.as_bytes())?;
    for &index in &indices {
        let (child_key, child_chain) = derive_child(curve, &key, &chain_code, index)?;
        key.zeroize();
        chain_code.zeroize();
        key = child_key;
        chain_code = child_chain;
    }
    chain_code.zeroize();

    let secret = Zeroizing::new(key);
    key.zeroize();

    let uncompressed_sec1 = curve.public_key(&secret, false)?;
    let compressed_sec1 = curve.public_key(&secret, true)?;

    if uncompressed_sec1.len() != 65 || compressed_sec1.len() != 33 {
        return Err(FrwError::CryptoError {
            reason: "unexpected SEC1 public key length".into(),
        });
    }

    let mut uncompressed = [0u8; 64];
    uncompressed.copy_from_slice(&uncompressed_sec1[1..]);
    let mut compressed = [0u8; 33];
    compressed.copy_from_slice(&compressed_sec1);

    Ok(DerivedPublicKey {
        curve,
        uncompressed,
        compressed,
    })
}

// ---------------------------------------------------------------------------
// Internal: master key
// ---------------------------------------------------------------------------

fn master_key(curve: Curve, seed: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let mut i = hmac_sha512(curve.seed_key(), seed)?;
    loop {
        let (key, chain_code) = split(&i);
        if curve.is_valid_secret(&key) {
            i.zeroize();
            return Ok((key, chain_code));
        }
        let next = hmac_sha512(curve.seed_key(), &i)?;
        i.zeroize();
        i = next;
    }
}

// ---------------------------------------------------------------------------
// Internal: child derivation
// ---------------------------------------------------------------------------

/// Derives child `index` (hardened bit already applied) of a parent key.
fn derive_child(
    curve: Curve,
    parent_key: &[u8; 32],
    parent_chain_code: &[u8; 32],
    index: u32,
) -> Result<([u8; 32], [u8; 32])> {
    // data = 0x00 || k_par || ser32(i)   or   serP(K_par) || ser32(i); 37 bytes either way
    let mut data = [0u8; 37];
    if index >= HARDENED_OFFSET {
        data[1..33].copy_from_slice(parent_key);
    } else {
        let point = curve.public_key(parent_key, true)?;
        data[..33].copy_from_slice(&point);
    }
    data[33..].copy_from_slice(&index.to_be_bytes());

    let mut i = hmac_sha512(parent_chain_code, &data)?;
    data.zeroize();

    loop {
        let (mut tweak, chain_code) = split(&i);
        let child = curve.tweak_add(&tweak, parent_key);
        tweak.zeroize();
        if let Some(child_key) = child {
            i.zeroize();
            return Ok((child_key, chain_code));
        }

        // Invalid IL or zero child: I = HMAC(c_par, 0x01 || IR || ser32(i)).
        let mut retry = [0u8; 37];
        retry[0] = 0x01;
        retry[1..33].copy_from_slice(&i[32..]);
        retry[33..].copy_from_slice(&index.to_be_bytes());
        let next = hmac_sha512(parent_chain_code, &retry)?;
        retry.zeroize();
        i.zeroize();
        i = next;
    }
}

fn split(i: &[u8; 64]) -> ([u8; 32], [u8; 32]) {
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&i[..32]);
    right.copy_from_slice(&i[32..]);
    (left, right)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64]> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|e| FrwError::CryptoError {
        reason: format!("HMAC-SHA512 key init failed: {e}"),
    })?;
    mac.update(data);
    let result = mac.finalize().into_bytes();

    let mut output = [0u8; 64];
    output.copy_from_slice(&result);
    Ok(output)
}

// ---------------------------------------------------------------------------
// Internal: path parsing
// ---------------------------------------------------------------------------

/// Parses `m/44'/60'/0'/0/0` into child indices with the hardened bit set
/// where marked.
fn parse_derivation_path(path: &str) -> Result<Vec<u32>> {
    let trimmed = path.trim();
    let components = trimmed.strip_prefix("m/").ok_or_else(|| FrwError::DerivationError {
        reason: format!("derivation path must start with 'm/', got '{trimmed}'"),
    })?;

    if components.is_empty() {
        return Err(FrwError::DerivationError {
            reason: "derivation path must have at least one component".into(),
        });
    }

    components
        .split('/')
        .map(|part| {
            let part = part.trim();
            let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits.parse().map_err(|e| FrwError::DerivationError {
                reason: format!("invalid index '{part}' in path: {e}"),
            })?;
            if index >= HARDENED_OFFSET {
                return Err(FrwError::DerivationError {
                    reason: format!("index {index} exceeds maximum ({})", HARDENED_OFFSET - 1),
                });
            }
            Ok(if hardened { index | HARDENED_OFFSET } else { index })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Curve arithmetic
// ---------------------------------------------------------------------------

mod secp256k1 {
    use frw_types::{FrwError, Result};
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use k256::elliptic_curve::{Field, PrimeField};
    use k256::{FieldBytes, Scalar, SecretKey};

    pub(super) fn is_valid_secret(bytes: &[u8; 32]) -> bool {
        SecretKey::from_bytes(FieldBytes::from_slice(bytes)).is_ok()
    }

    pub(super) fn tweak_add(tweak: &[u8; 32], parent: &[u8; 32]) -> Option<[u8; 32]> {
        let tweak: Option<Scalar> = Scalar::from_repr(FieldBytes::from_slice(tweak).clone()).into();
        let parent: Option<Scalar> = Scalar::from_repr(FieldBytes::from_slice(parent).clone()).into();
        let sum = tweak? + parent?;
        if bool::from(sum.is_zero()) {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&sum.to_repr());
        Some(out)
    }

    pub(super) fn public_key(secret: &[u8; 32], compressed: bool) -> Result<Vec<u8>> {
        let secret = SecretKey::from_bytes(FieldBytes::from_slice(secret)).map_err(|e| {
            FrwError::CryptoError {
                reason: format!("invalid secp256k1 private key: {e}"),
            }
        })?;
        Ok(secret.public_key().to_encoded_point(compressed).as_bytes().to_vec())
    }
}

mod nist256p1 {
    use frw_types::{FrwError, Result};
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use p256::elliptic_curve::{Field, PrimeField};
    use p256::{FieldBytes, Scalar, SecretKey};

    pub(super) fn is_valid_secret(bytes: &[u8; 32]) -> bool {
        SecretKey::from_bytes(FieldBytes::from_slice(bytes)).is_ok()
    }

    pub(super) fn tweak_add(tweak: &[u8; 32], parent: &[u8; 32]) -> Option<[u8; 32]> {
        let tweak: Option<Scalar> = Scalar::from_repr(FieldBytes::from_slice(tweak).clone()).into();
        let parent: Option<Scalar> = Scalar::from_repr(FieldBytes::from_slice(parent).clone()).into();
        let sum = tweak? + parent?;
        if bool::from(sum.is_zero()) {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&sum.to_repr());
        Some(out)
    }

    pub(super) fn public_key(secret: &[u8; 32], compressed: bool) -> Result<Vec<u8>> {
        let secret = SecretKey::from_bytes(FieldBytes::from_slice(secret)).map_err(|e| {
            FrwError::CryptoError {
                reason: format!("invalid P-256 private key: {e}"),
            }
        })?;
        Ok(secret.public_key().to_encoded_point(compressed).as_bytes().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
