//! Algorithm-indexed key factories.
//!
//! The registry is built once at startup (usually via [`CryptoRegistry::default`],
//! which installs AES, PLAIN, RSA and ECC) and then shared behind an `Arc`;
//! nothing mutates it afterwards. Lookups key off the `"algorithm"` field of
//! the key dictionary and return `None` for unregistered algorithms or
//! malformed dictionaries, which callers treat as a validation failure.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::aes::{AesKeyFactory, AES};
use crate::coder::{self, Dict};
use crate::ecc::{EccPrivateFactory, EccPublicFactory, ECC};
use crate::keys::{
    PrivateKey, PrivateKeyFactory, PublicKey, PublicKeyFactory, SymmetricKey,
    SymmetricKeyFactory,
};
use crate::plain::{PlainKeyFactory, PLAIN};
use crate::rsa::{RsaPrivateFactory, RsaPublicFactory, RSA};

pub struct CryptoRegistry {
    symmetric: HashMap<String, Box<dyn SymmetricKeyFactory>>,
    public: HashMap<String, Box<dyn PublicKeyFactory>>,
    private: HashMap<String, Box<dyn PrivateKeyFactory>>,
}

impl CryptoRegistry {
    /// An empty registry; algorithms must be registered before use.
    pub fn empty() -> Self {
        Self {
            symmetric: HashMap::new(),
            public: HashMap::new(),
            private: HashMap::new(),
        }
    }

    pub fn register_symmetric(&mut self, algorithm: &str, factory: Box<dyn SymmetricKeyFactory>) {
        self.symmetric.insert(algorithm.to_owned(), factory);
    }

    pub fn register_public(&mut self, algorithm: &str, factory: Box<dyn PublicKeyFactory>) {
        self.public.insert(algorithm.to_owned(), factory);
    }

    pub fn register_private(&mut self, algorithm: &str, factory: Box<dyn PrivateKeyFactory>) {
        self.private.insert(algorithm.to_owned(), factory);
    }

    /// Parse a symmetric key dictionary.
    pub fn symmetric_parse(&self, dict: &Dict) -> Option<Arc<dyn SymmetricKey>> {
        let algorithm = coder::get_str(dict, "algorithm")?;
        match self.symmetric.get(algorithm) {
            Some(factory) => factory.parse(dict),
            None => {
                debug!(algorithm, "no symmetric key factory");
                None
            }
        }
    }

    /// Generate a fresh symmetric key for `algorithm`.
    pub fn symmetric_generate(&self, algorithm: &str) -> Option<Arc<dyn SymmetricKey>> {
        self.symmetric.get(algorithm).map(|factory| factory.generate())
    }

    /// Parse a public key dictionary.
    pub fn public_parse(&self, dict: &Dict) -> Option<Arc<dyn PublicKey>> {
        let algorithm = coder::get_str(dict, "algorithm")?;
        match self.public.get(algorithm) {
            Some(factory) => factory.parse(dict),
            None => {
                debug!(algorithm, "no public key factory");
                None
            }
        }
    }

    /// Parse a private key dictionary.
    pub fn private_parse(&self, dict: &Dict) -> Option<Arc<dyn PrivateKey>> {
        let algorithm = coder::get_str(dict, "algorithm")?;
        self.private.get(algorithm).and_then(|factory| factory.parse(dict))
    }

    /// Generate a fresh private key for `algorithm`.
    pub fn private_generate(&self, algorithm: &str) -> Option<Arc<dyn PrivateKey>> {
        self.private.get(algorithm).and_then(|factory| factory.generate())
    }
}

impl Default for CryptoRegistry {
    /// The standard plugin set: AES + PLAIN symmetric, RSA + ECC asymmetric.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_symmetric(AES, Box::new(AesKeyFactory));
        registry.register_symmetric(PLAIN, Box::new(PlainKeyFactory));
        registry.register_public(RSA, Box::new(RsaPublicFactory));
        registry.register_public(ECC, Box::new(EccPublicFactory));
        registry.register_private(RSA, Box::new(RsaPrivateFactory));
        registry.register_private(ECC, Box::new(EccPrivateFactory));
        registry
    }
}
