//! Meta: the immutable identity proof.
//!
//! A meta binds a public key to an identifier. Seeded metas (MKM) carry a
//! `seed` string and a `fingerprint` — the seed signed by the key — so the
//! name is certified too. Seedless metas (BTC/ETH families) derive the
//! address straight from the key material.

use std::sync::Arc;

use serde_json::Value;

use dim_crypto::coder::{self, Dict};
use dim_crypto::{CryptoRegistry, PrivateKey, PublicKey};

use crate::address::Address;
use crate::error::MkmError;
use crate::identifier::ID;

/// Meta type bytes.
pub mod meta_type {
    pub const MKM: u8 = 1;
    pub const BTC: u8 = 2;
    pub const EX_BTC: u8 = 3;
    pub const ETH: u8 = 4;
    pub const EX_ETH: u8 = 5;
}

#[derive(Clone)]
pub struct Meta {
    dict: Dict,
    version: u8,
    key: Arc<dyn PublicKey>,
    seed: Option<String>,
    fingerprint: Option<Vec<u8>>,
}

impl Meta {
    /// Parse a meta dictionary. `None` on missing fields, an unknown key
    /// algorithm, or a seeded meta without its fingerprint.
    pub fn parse(dict: &Dict, registry: &CryptoRegistry) -> Option<Self> {
        let version = coder::get_u8(dict, "type")?;
        let key = registry.public_parse(coder::get_dict(dict, "key")?)?;
        let seed = coder::get_str(dict, "seed").map(str::to_owned);
        let fingerprint = coder::get_bytes(dict, "fingerprint");
        if seed.is_some() != fingerprint.is_some() {
            return None;
        }
        if version == meta_type::MKM && seed.is_none() {
            return None;
        }
        Some(Self {
            dict: dict.clone(),
            version,
            key,
            seed,
            fingerprint,
        })
    }

    /// Build a new meta signed by `private_key`. Seeded types require a
    /// seed; seedless types ignore it.
    pub fn generate(
        version: u8,
        private_key: &dyn PrivateKey,
        seed: Option<&str>,
    ) -> Result<Self, MkmError> {
        let key = private_key.public_key();
        let mut dict = Dict::new();
        dict.insert("type".into(), Value::from(version));
        dict.insert("key".into(), Value::Object(key.to_dict()));
        let (seed, fingerprint) = match version {
            meta_type::MKM => {
                let seed = seed
                    .ok_or_else(|| MkmError::InvalidFormat("seed required".into()))?;
                let fingerprint = private_key
                    .sign(seed.as_bytes())
                    .map_err(|error| MkmError::Key(error.to_string()))?;
                dict.insert("seed".into(), Value::from(seed));
                dict.insert(
                    "fingerprint".into(),
                    Value::from(coder::base64_encode(&fingerprint)),
                );
                (Some(seed.to_owned()), Some(fingerprint))
            }
            meta_type::BTC | meta_type::EX_BTC | meta_type::ETH | meta_type::EX_ETH => {
                (None, None)
            }
            other => return Err(MkmError::UnsupportedMetaType(other)),
        };
        Ok(Self {
            dict,
            version,
            key,
            seed,
            fingerprint,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn public_key(&self) -> Arc<dyn PublicKey> {
        self.key.clone()
    }

    pub fn seed(&self) -> Option<&str> {
        self.seed.as_deref()
    }

    /// Self-check: a seeded meta must carry a valid signature of its seed.
    pub fn is_valid(&self) -> bool {
        match (&self.seed, &self.fingerprint) {
            (Some(seed), Some(fingerprint)) => self.key.verify(seed.as_bytes(), fingerprint),
            (None, None) => true,
            _ => false,
        }
    }

    /// Derive the address this meta certifies for the given network byte.
    pub fn generate_address(&self, network: u8) -> Result<Address, MkmError> {
        match self.version {
            meta_type::MKM => {
                let fingerprint = self
                    .fingerprint
                    .as_deref()
                    .ok_or_else(|| MkmError::InvalidFormat("fingerprint missing".into()))?;
                Ok(Address::btc_from_data(fingerprint, network))
            }
            meta_type::BTC | meta_type::EX_BTC => {
                Ok(Address::btc_from_data(&self.key.data(), network))
            }
            meta_type::ETH | meta_type::EX_ETH => Address::eth_from_data(&self.key.data()),
            other => Err(MkmError::UnsupportedMetaType(other)),
        }
    }

    /// Full match: seed certifies the name (when present) and the derived
    /// address equals the identifier's address.
    pub fn match_identifier(&self, identifier: &ID) -> bool {
        if !self.is_valid() {
            return false;
        }
        if let Some(seed) = &self.seed {
            if identifier.name() != Some(seed.as_str()) {
                return false;
            }
        }
        match self.generate_address(identifier.network()) {
            Ok(address) => &address == identifier.address(),
            Err(_) => false,
        }
    }

    pub fn to_dict(&self) -> &Dict {
        &self.dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dim_crypto::ecc::EccPrivate;

    #[test]
    fn test_eth_meta_regenerates_known_address() {
        let raw =
            hex::decode("18e14a7b6a307f426a94f8114701e7c8e774e7f9a47e2c2035db29a206321725")
                .unwrap();
        let sk = EccPrivate::from_bytes(&raw).unwrap();
        let meta = Meta::generate(meta_type::ETH, &sk, None).unwrap();
        assert!(meta.is_valid());

        let address = meta.generate_address(crate::network::USER).unwrap();
        assert_eq!(
            address.to_string(),
            "0x3E9003153d9A39D3f57B126b0c38513D5e289c3E"
        );

        let id = ID::new(None, address, None);
        assert!(meta.match_identifier(&id));
    }

    #[test]
    fn test_mkm_meta_seed_and_name() {
        let sk = EccPrivate::generate();
        let meta = Meta::generate(meta_type::MKM, &sk, Some("moki")).unwrap();
        assert!(meta.is_valid());

        let address = meta.generate_address(crate::network::USER).unwrap();
        let id = ID::new(Some("moki"), address.clone(), None);
        assert!(meta.match_identifier(&id));

        // same address, wrong name
        let impostor = ID::new(Some("hulk"), address, None);
        assert!(!meta.match_identifier(&impostor));
    }

    #[test]
    fn test_parse_roundtrip() {
        let registry = CryptoRegistry::default();
        let sk = EccPrivate::generate();
        let meta = Meta::generate(meta_type::MKM, &sk, Some("moki")).unwrap();
        let parsed = Meta::parse(meta.to_dict(), &registry).unwrap();
        assert!(parsed.is_valid());
        assert_eq!(parsed.seed(), Some("moki"));
    }

    #[test]
    fn test_parse_rejects_seed_without_fingerprint() {
        let registry = CryptoRegistry::default();
        let sk = EccPrivate::generate();
        let meta = Meta::generate(meta_type::MKM, &sk, Some("moki")).unwrap();
        let mut dict = meta.to_dict().clone();
        dict.remove("fingerprint");
        assert!(Meta::parse(&dict, &registry).is_none());
    }

    #[test]
    fn test_tampered_seed_invalid() {
        let registry = CryptoRegistry::default();
        let sk = EccPrivate::generate();
        let meta = Meta::generate(meta_type::MKM, &sk, Some("moki")).unwrap();
        let mut dict = meta.to_dict().clone();
        dict.insert("seed".into(), Value::from("loki"));
        let forged = Meta::parse(&dict, &registry).unwrap();
        assert!(!forged.is_valid());
    }
}
