//! Key traits.
//!
//! Keys are dictionary-backed: every key can reproduce the exact JSON object
//! it was parsed from (plus any fields a factory filled in), which is what
//! gets wrapped, cached and persisted. Equality between keys is structural
//! equality of those dictionaries.

use std::sync::Arc;

use crate::coder::Dict;
use crate::error::CryptoError;

/// A symmetric cipher key shared between one sender and one receiver.
pub trait SymmetricKey: Send + Sync {
    /// Algorithm token, e.g. `"AES"` or `"PLAIN"`.
    fn algorithm(&self) -> &str;

    /// Raw key material. Empty for `PLAIN`.
    fn data(&self) -> &[u8];

    /// Encrypt `plaintext`. Per-message parameters (the AES IV) are written
    /// into `extra`, which is merged into the enclosing message.
    fn encrypt(&self, plaintext: &[u8], extra: &mut Dict) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `ciphertext` with parameters looked up from `params`
    /// (the enclosing message dictionary).
    fn decrypt(&self, ciphertext: &[u8], params: &Dict) -> Result<Vec<u8>, CryptoError>;

    /// The backing dictionary, suitable for wrapping and caching.
    fn to_dict(&self) -> Dict;
}

/// Structural equality over all dictionary fields.
pub fn symmetric_keys_equal(a: &dyn SymmetricKey, b: &dyn SymmetricKey) -> bool {
    a.to_dict() == b.to_dict()
}

/// A public key: always verifies; encrypts only if the algorithm is
/// encryption-capable (RSA yes, ECC no).
pub trait PublicKey: Send + Sync {
    /// Algorithm token, e.g. `"RSA"` or `"ECC"`.
    fn algorithm(&self) -> &str;

    /// Raw key material used as the meta fingerprint source for seedless
    /// metas: DER bytes for RSA, the uncompressed 65-byte point for ECC.
    fn data(&self) -> Vec<u8>;

    /// Verify `signature` over `data`.
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;

    /// Whether this algorithm can wrap message keys.
    fn can_encrypt(&self) -> bool {
        false
    }

    /// Wrap `plaintext` (a serialized symmetric key). `None` when the
    /// algorithm cannot encrypt.
    fn encrypt(&self, plaintext: &[u8]) -> Option<Vec<u8>>;

    fn to_dict(&self) -> Dict;
}

/// A private key: always signs; decrypts only if encryption-capable.
pub trait PrivateKey: Send + Sync {
    fn algorithm(&self) -> &str;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Unwrap a wrapped symmetric key. `None` when the algorithm cannot
    /// decrypt or the ciphertext does not match.
    fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>>;

    /// The matching public key.
    fn public_key(&self) -> Arc<dyn PublicKey>;

    fn to_dict(&self) -> Dict;
}

//
//  Factories, registered by algorithm token in the registry
//

pub trait SymmetricKeyFactory: Send + Sync {
    fn generate(&self) -> Arc<dyn SymmetricKey>;
    fn parse(&self, dict: &Dict) -> Option<Arc<dyn SymmetricKey>>;
}

pub trait PublicKeyFactory: Send + Sync {
    fn parse(&self, dict: &Dict) -> Option<Arc<dyn PublicKey>>;
}

pub trait PrivateKeyFactory: Send + Sync {
    /// `None` only when key generation itself fails (broken RNG).
    fn generate(&self) -> Option<Arc<dyn PrivateKey>>;
    fn parse(&self, dict: &Dict) -> Option<Arc<dyn PrivateKey>>;
}
