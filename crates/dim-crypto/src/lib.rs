//! # dim-crypto
//!
//! Cryptographic building blocks for the DIM client core: symmetric ciphers
//! (AES-256-CBC, plaintext pass-through for broadcasts), asymmetric keys
//! (RSA, secp256k1 ECDSA), message digests, transport coders and the
//! canonical JSON used for signing.
//!
//! All key material is dictionary-backed so keys round-trip through the wire
//! format without losing unknown fields. The [`CryptoRegistry`] maps
//! algorithm tokens to key factories and is built once at startup, then
//! shared read-only.

pub mod aes;
pub mod coder;
pub mod digest;
pub mod ecc;
pub mod keys;
pub mod plain;
pub mod registry;
pub mod rsa;

mod error;

pub use coder::Dict;
pub use error::CryptoError;
pub use keys::{PrivateKey, PublicKey, SymmetricKey};
pub use registry::CryptoRegistry;
