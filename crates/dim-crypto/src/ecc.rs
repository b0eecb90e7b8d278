//! secp256k1 keys: ECDSA-SHA256 signatures (DER encoded on the wire).
//!
//! ECC keys sign and verify only; they cannot wrap message keys. The private
//! key travels as 32 raw bytes in hex, the public key as the uncompressed
//! 65-byte point in hex. The raw point is also what ETH-style addresses are
//! derived from.

use std::sync::Arc;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde_json::Value;

use crate::coder::{self, Dict};
use crate::error::CryptoError;
use crate::keys::{PrivateKey, PrivateKeyFactory, PublicKey, PublicKeyFactory};

pub const ECC: &str = "ECC";

pub struct EccPublic {
    dict: Dict,
    key: VerifyingKey,
}

impl EccPublic {
    pub fn parse(dict: &Dict) -> Option<Self> {
        let data = coder::get_str(dict, "data")?;
        let bytes = coder::hex_decode(data)?;
        let key = VerifyingKey::from_sec1_bytes(&bytes).ok()?;
        Some(Self {
            dict: dict.clone(),
            key,
        })
    }

    fn from_key(key: VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), Value::from(ECC));
        dict.insert("curve".into(), Value::from("SECP256k1"));
        dict.insert("data".into(), Value::from(coder::hex_encode(point.as_bytes())));
        Self { dict, key }
    }
}

impl PublicKey for EccPublic {
    fn algorithm(&self) -> &str {
        ECC
    }

    fn data(&self) -> Vec<u8> {
        self.key.to_encoded_point(false).as_bytes().to_vec()
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let sig = match Signature::from_der(signature)
            .or_else(|_| Signature::from_slice(signature))
        {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        self.key.verify(data, &sig).is_ok()
    }

    fn encrypt(&self, _plaintext: &[u8]) -> Option<Vec<u8>> {
        // not an encryption key
        None
    }

    fn to_dict(&self) -> Dict {
        self.dict.clone()
    }
}

pub struct EccPrivate {
    dict: Dict,
    key: SigningKey,
}

impl EccPrivate {
    pub fn generate() -> Self {
        let key = SigningKey::random(&mut OsRng);
        Self::from_key(key)
    }

    pub fn parse(dict: &Dict) -> Option<Self> {
        let data = coder::get_str(dict, "data")?;
        let bytes = coder::hex_decode(data)?;
        let key = SigningKey::from_slice(&bytes).ok()?;
        Some(Self {
            dict: dict.clone(),
            key,
        })
    }

    /// Build from raw 32-byte scalar bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let key = SigningKey::from_slice(bytes).ok()?;
        Some(Self::from_key(key))
    }

    fn from_key(key: SigningKey) -> Self {
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), Value::from(ECC));
        dict.insert("curve".into(), Value::from("SECP256k1"));
        dict.insert(
            "data".into(),
            Value::from(coder::hex_encode(&key.to_bytes())),
        );
        Self { dict, key }
    }
}

impl PrivateKey for EccPrivate {
    fn algorithm(&self) -> &str {
        ECC
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.key.sign(data);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn decrypt(&self, _ciphertext: &[u8]) -> Option<Vec<u8>> {
        // not a decryption key
        None
    }

    fn public_key(&self) -> Arc<dyn PublicKey> {
        Arc::new(EccPublic::from_key(*self.key.verifying_key()))
    }

    fn to_dict(&self) -> Dict {
        self.dict.clone()
    }
}

pub struct EccPublicFactory;

impl PublicKeyFactory for EccPublicFactory {
    fn parse(&self, dict: &Dict) -> Option<Arc<dyn PublicKey>> {
        EccPublic::parse(dict).map(|key| Arc::new(key) as Arc<dyn PublicKey>)
    }
}

pub struct EccPrivateFactory;

impl PrivateKeyFactory for EccPrivateFactory {
    fn generate(&self) -> Option<Arc<dyn PrivateKey>> {
        Some(Arc::new(EccPrivate::generate()))
    }

    fn parse(&self, dict: &Dict) -> Option<Arc<dyn PrivateKey>> {
        EccPrivate::parse(dict).map(|key| Arc::new(key) as Arc<dyn PrivateKey>)
    }
}
