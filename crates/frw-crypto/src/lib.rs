//! Cryptographic primitives for the wallet credential core.
//!
//! This crate is the **sole** location for cryptographic operations.
//! Other crates work with seed phrases, public keys and opaque blobs only.
//!
//! # Modules
//!
//! - [`mnemonic`]: BIP39 seed phrase generation and seed derivation
//! - [`hd_derive`]: SLIP-0010 derivation for P-256 and secp256k1
//! - [`kdf`]: Argon2id passphrase stretching
//! - [`cipher`]: XChaCha20-Poly1305 sealing of vault secrets

pub mod cipher;
pub mod hd_derive;
pub mod kdf;
pub mod mnemonic;

pub use cipher::{PassphraseCipher, VaultCipher};
pub use hd_derive::{derive_public_key, Curve, DerivedPublicKey};
pub use mnemonic::{EntropySource, OsEntropy, Seed, SeedPhrase, SeedStrength};
