//! RSA keys: OAEP-SHA256 for wrapping message keys, PKCS#1 v1.5 with
//! SHA-256 for signatures. Key material travels as PEM text in the `data`
//! field of the key dictionary.

use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::coder::{self, Dict};
use crate::error::CryptoError;
use crate::keys::{PrivateKey, PrivateKeyFactory, PublicKey, PublicKeyFactory};

pub const RSA: &str = "RSA";

const DEFAULT_BITS: usize = 2048;

pub struct RsaPublic {
    dict: Dict,
    key: RsaPublicKey,
}

impl RsaPublic {
    pub fn parse(dict: &Dict) -> Option<Self> {
        let pem = coder::get_str(dict, "data")?;
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .ok()?;
        Some(Self {
            dict: dict.clone(),
            key,
        })
    }

    fn from_key(key: RsaPublicKey) -> Self {
        let pem = key
            .to_public_key_pem(LineEnding::LF)
            .unwrap_or_default();
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), Value::from(RSA));
        dict.insert("data".into(), Value::from(pem));
        Self { dict, key }
    }
}

impl PublicKey for RsaPublic {
    fn algorithm(&self) -> &str {
        RSA
    }

    fn data(&self) -> Vec<u8> {
        self.key
            .to_pkcs1_der()
            .map(|der| der.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let digest = Sha256::digest(data);
        self.key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .is_ok()
    }

    fn can_encrypt(&self) -> bool {
        true
    }

    fn encrypt(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        self.key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .ok()
    }

    fn to_dict(&self) -> Dict {
        self.dict.clone()
    }
}

pub struct RsaPrivate {
    dict: Dict,
    key: RsaPrivateKey,
}

impl RsaPrivate {
    pub fn generate() -> Option<Self> {
        let key = RsaPrivateKey::new(&mut OsRng, DEFAULT_BITS).ok()?;
        let pem = key.to_pkcs1_pem(LineEnding::LF).ok()?;
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), Value::from(RSA));
        dict.insert("data".into(), Value::from(pem.to_string()));
        Some(Self { dict, key })
    }

    pub fn parse(dict: &Dict) -> Option<Self> {
        let pem = coder::get_str(dict, "data")?;
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .ok()?;
        Some(Self {
            dict: dict.clone(),
            key,
        })
    }
}

impl PrivateKey for RsaPrivate {
    fn algorithm(&self) -> &str {
        RSA
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = Sha256::digest(data);
        self.key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|error| CryptoError::SignFailed(error.to_string()))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        self.key.decrypt(Oaep::new::<Sha256>(), ciphertext).ok()
    }

    fn public_key(&self) -> Arc<dyn PublicKey> {
        Arc::new(RsaPublic::from_key(RsaPublicKey::from(&self.key)))
    }

    fn to_dict(&self) -> Dict {
        self.dict.clone()
    }
}

pub struct RsaPublicFactory;

impl PublicKeyFactory for RsaPublicFactory {
    fn parse(&self, dict: &Dict) -> Option<Arc<dyn crate::keys::PublicKey>> {
        RsaPublic::parse(dict).map(|key| Arc::new(key) as Arc<dyn crate::keys::PublicKey>)
    }
}

pub struct RsaPrivateFactory;

impl PrivateKeyFactory for RsaPrivateFactory {
    fn generate(&self) -> Option<Arc<dyn PrivateKey>> {
        RsaPrivate::generate().map(|key| Arc::new(key) as Arc<dyn PrivateKey>)
    }

    fn parse(&self, dict: &Dict) -> Option<Arc<dyn PrivateKey>> {
        RsaPrivate::parse(dict).map(|key| Arc::new(key) as Arc<dyn PrivateKey>)
    }
}
