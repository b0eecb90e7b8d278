//! No-op cipher for broadcast messages.
//!
//! Broadcast receivers cannot share a secret, so their content is only
//! encoded, never encrypted. The key is a singleton with empty material and
//! is never cached or wrapped.

use std::sync::Arc;

use serde_json::Value;

use crate::coder::Dict;
use crate::error::CryptoError;
use crate::keys::{SymmetricKey, SymmetricKeyFactory};

pub const PLAIN: &str = "PLAIN";

pub struct PlainKey;

impl PlainKey {
    pub fn shared() -> Arc<dyn SymmetricKey> {
        Arc::new(PlainKey)
    }
}

impl SymmetricKey for PlainKey {
    fn algorithm(&self) -> &str {
        PLAIN
    }

    fn data(&self) -> &[u8] {
        &[]
    }

    fn encrypt(&self, plaintext: &[u8], _extra: &mut Dict) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8], _params: &Dict) -> Result<Vec<u8>, CryptoError> {
        Ok(ciphertext.to_vec())
    }

    fn to_dict(&self) -> Dict {
        let mut dict = Dict::new();
        dict.insert("algorithm".into(), Value::from(PLAIN));
        dict
    }
}

pub struct PlainKeyFactory;

impl SymmetricKeyFactory for PlainKeyFactory {
    fn generate(&self) -> Arc<dyn SymmetricKey> {
        PlainKey::shared()
    }

    fn parse(&self, _dict: &Dict) -> Option<Arc<dyn SymmetricKey>> {
        Some(PlainKey::shared())
    }
}
