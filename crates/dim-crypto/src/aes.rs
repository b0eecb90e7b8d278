//! AES-256-CBC with PKCS7 padding.
//!
//! Key dictionaries look like `{"algorithm":"AES","data":"<base64>"}`.
//! The IV is generated per message and travels outside the key, in the
//! enclosing message dictionary under `"IV"`.

use std::sync::Arc;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde_json::Value;

use crate::coder::{self, Dict};
use crate::error::CryptoError;
use crate::keys::{SymmetricKey, SymmetricKeyFactory};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const AES: &str = "AES";

const KEY_SIZE: usize = 32;
const BLOCK_SIZE: usize = 16;

pub struct AesKey {
    dict: Dict,
    data: Vec<u8>,
}

impl AesKey {
    /// Generate a fresh random 256-bit key.
    pub fn generate() -> Self {
        let mut data = vec![0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut data);
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), Value::from(AES));
        dict.insert("data".into(), Value::from(coder::base64_encode(&data)));
        Self { dict, data }
    }

    /// Parse a key dictionary; `None` when the data field is missing or has
    /// the wrong length.
    pub fn parse(dict: &Dict) -> Option<Self> {
        let data = coder::get_bytes(dict, "data")?;
        if data.len() != KEY_SIZE {
            return None;
        }
        Some(Self {
            dict: dict.clone(),
            data,
        })
    }

    /// Look for an IV in the message parameters, falling back to one stored
    /// on the key itself (older peers put it there).
    fn init_vector(&self, params: &Dict) -> Option<Vec<u8>> {
        let encoded = coder::get_str(params, "IV")
            .or_else(|| coder::get_str(params, "iv"))
            .or_else(|| coder::get_str(&self.dict, "iv"))
            .or_else(|| coder::get_str(&self.dict, "IV"))?;
        let iv = coder::base64_decode(encoded)?;
        (iv.len() == BLOCK_SIZE).then_some(iv)
    }
}

impl SymmetricKey for AesKey {
    fn algorithm(&self) -> &str {
        AES
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn encrypt(&self, plaintext: &[u8], extra: &mut Dict) -> Result<Vec<u8>, CryptoError> {
        // reuse an IV from extra if the caller set one, else roll a new one
        let iv = match self.init_vector(extra) {
            Some(iv) => iv,
            None => {
                let mut iv = vec![0u8; BLOCK_SIZE];
                rand::rngs::OsRng.fill_bytes(&mut iv);
                extra.insert("IV".into(), Value::from(coder::base64_encode(&iv)));
                iv
            }
        };
        let cipher = Aes256CbcEnc::new_from_slices(&self.data, &iv)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8], params: &Dict) -> Result<Vec<u8>, CryptoError> {
        let iv = self
            .init_vector(params)
            .ok_or(CryptoError::MissingParameter("IV"))?;
        let cipher = Aes256CbcDec::new_from_slices(&self.data, &iv)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    fn to_dict(&self) -> Dict {
        self.dict.clone()
    }
}

pub struct AesKeyFactory;

impl SymmetricKeyFactory for AesKeyFactory {
    fn generate(&self) -> Arc<dyn SymmetricKey> {
        Arc::new(AesKey::generate())
    }

    fn parse(&self, dict: &Dict) -> Option<Arc<dyn SymmetricKey>> {
        AesKey::parse(dict).map(|key| Arc::new(key) as Arc<dyn SymmetricKey>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_with_emitted_iv() {
        let key = AesKey::generate();
        let mut extra = Dict::new();
        let ciphertext = key.encrypt(b"moky", &mut extra).unwrap();
        assert!(extra.contains_key("IV"));
        assert_ne!(ciphertext, b"moky".to_vec());

        let plaintext = key.decrypt(&ciphertext, &extra).unwrap();
        assert_eq!(plaintext, b"moky".to_vec());
    }

    #[test]
    fn test_parsed_key_decrypts() {
        let key = AesKey::generate();
        let mut extra = Dict::new();
        let ciphertext = key.encrypt(b"moky", &mut extra).unwrap();

        let restored = AesKey::parse(&key.to_dict()).unwrap();
        assert_eq!(restored.decrypt(&ciphertext, &extra).unwrap(), b"moky".to_vec());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = AesKey::generate();
        let other = AesKey::generate();
        let mut extra = Dict::new();
        let ciphertext = key.encrypt(b"secret", &mut extra).unwrap();
        // padding check rejects almost all garbage; never the real plaintext
        match other.decrypt(&ciphertext, &extra) {
            Ok(plaintext) => assert_ne!(plaintext, b"secret".to_vec()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_missing_iv_fails() {
        let key = AesKey::generate();
        let mut extra = Dict::new();
        let ciphertext = key.encrypt(b"secret", &mut extra).unwrap();
        assert!(key.decrypt(&ciphertext, &Dict::new()).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_data() {
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), serde_json::Value::from(AES));
        assert!(AesKey::parse(&dict).is_none());
        dict.insert("data".into(), serde_json::Value::from("c2hvcnQ="));
        assert!(AesKey::parse(&dict).is_none());
    }
}
