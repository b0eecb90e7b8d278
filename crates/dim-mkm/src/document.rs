//! Signed attribute bundles.
//!
//! A document carries `{ID, type, data, signature}` where `data` is the
//! canonical JSON string of the property map and `signature` covers exactly
//! those bytes. Documents are mutable by re-signing with a later `time`
//! property; stale updates are rejected upstream by comparing times.
//!
//! Well-known types: a user's `visa` (embeds the encryption public key), a
//! user `profile`, and a group `bulletin` (founder, administrators,
//! assistants).

use std::sync::OnceLock;

use serde_json::Value;
use tracing::warn;

use dim_crypto::coder::{self, Dict};
use dim_crypto::{CryptoRegistry, PrivateKey, PublicKey};

use crate::error::MkmError;
use crate::identifier::ID;

pub const VISA: &str = "visa";
pub const PROFILE: &str = "profile";
pub const BULLETIN: &str = "bulletin";

#[derive(Clone)]
pub struct Document {
    dict: Dict,
    identifier: ID,
    // lazy parse of the `data` JSON string
    properties: OnceLock<Dict>,
}

impl Document {
    /// A fresh, unsigned document for `identifier`.
    pub fn new(identifier: ID, doc_type: &str) -> Self {
        let mut dict = Dict::new();
        dict.insert("ID".into(), Value::from(identifier.to_string()));
        dict.insert("type".into(), Value::from(doc_type));
        Self {
            dict,
            identifier,
            properties: OnceLock::new(),
        }
    }

    /// Parse a received document; requires identifier, data and signature.
    pub fn parse(dict: &Dict) -> Result<Self, MkmError> {
        let id_str = coder::get_str(dict, "ID")
            .ok_or_else(|| MkmError::InvalidFormat("document without ID".into()))?;
        let identifier = ID::parse(id_str)?;
        if coder::get_str(dict, "data").is_none() || coder::get_str(dict, "signature").is_none() {
            return Err(MkmError::InvalidFormat("document unsigned".into()));
        }
        Ok(Self {
            dict: dict.clone(),
            identifier,
            properties: OnceLock::new(),
        })
    }

    pub fn identifier(&self) -> &ID {
        &self.identifier
    }

    pub fn doc_type(&self) -> &str {
        coder::get_str(&self.dict, "type").unwrap_or(PROFILE)
    }

    fn properties(&self) -> &Dict {
        self.properties.get_or_init(|| {
            coder::get_str(&self.dict, "data")
                .and_then(|data| coder::json_decode(data.as_bytes()))
                .unwrap_or_default()
        })
    }

    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties().get(key)
    }

    /// Update a property; discards the previous signature.
    pub fn set_property(&mut self, key: &str, value: Value) {
        let mut properties = self.properties().clone();
        properties.insert(key.to_owned(), value);
        self.dict.remove("data");
        self.dict.remove("signature");
        self.properties = OnceLock::from(properties);
    }

    /// The signing time of the current property set, fractional seconds.
    pub fn time(&self) -> Option<f64> {
        self.get_property("time").and_then(Value::as_f64)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_property("name").and_then(Value::as_str)
    }

    /// Re-canonicalize the properties and sign them, bumping `time`
    /// monotonically. Returns the signature.
    pub fn sign(&mut self, private_key: &dyn PrivateKey) -> Result<Vec<u8>, MkmError> {
        let mut now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        if let Some(previous) = self.time() {
            if previous >= now {
                now = previous + 0.001;
            }
        }
        self.set_property("time", Value::from(now));

        let data = String::from_utf8(coder::json_encode(self.properties()))
            .unwrap_or_default();
        let signature = private_key
            .sign(data.as_bytes())
            .map_err(|error| MkmError::Key(error.to_string()))?;
        self.dict.insert("data".into(), Value::from(data));
        self.dict.insert(
            "signature".into(),
            Value::from(coder::base64_encode(&signature)),
        );
        Ok(signature)
    }

    /// Check the signature over the canonical data bytes.
    pub fn verify(&self, public_key: &dyn PublicKey) -> bool {
        let data = match coder::get_str(&self.dict, "data") {
            Some(data) => data,
            None => return false,
        };
        let signature = match coder::get_bytes(&self.dict, "signature") {
            Some(signature) => signature,
            None => {
                warn!(identifier = %self.identifier, "document signature unreadable");
                return false;
            }
        };
        public_key.verify(data.as_bytes(), &signature)
    }

    //
    //  Visa
    //

    /// The encryption public key a visa publishes for its user.
    pub fn visa_key(&self, registry: &CryptoRegistry) -> Option<std::sync::Arc<dyn PublicKey>> {
        let key = self.get_property("key")?.as_object()?;
        registry.public_parse(key)
    }

    //
    //  Bulletin
    //

    pub fn founder(&self) -> Option<ID> {
        let founder = self.get_property("founder").and_then(Value::as_str)?;
        ID::parse(founder).ok()
    }

    pub fn administrators(&self) -> Vec<ID> {
        match self.get_property("administrators").and_then(Value::as_array) {
            Some(admins) => admins
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|text| ID::parse(text).ok())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn assistants(&self) -> Vec<ID> {
        match self.get_property("assistants").and_then(Value::as_array) {
            Some(bots) => bots
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|text| ID::parse(text).ok())
                .collect(),
            None => Vec::new(),
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
    use crate::meta::{meta_type, Meta};

    fn user_id(sk: &EccPrivate, name: &str) -> ID {
        let meta = Meta::generate(meta_type::MKM, sk, Some(name)).unwrap();
        let address = meta.generate_address(crate::network::USER).unwrap();
        ID::new(Some(name), address, None)
    }

    #[test]
    fn test_sign_verify() {
        let sk = EccPrivate::generate();
        let id = user_id(&sk, "moki");
        let mut doc = Document::new(id, PROFILE);
        doc.set_property("name", Value::from("Moki"));
        doc.sign(&sk).unwrap();

        assert!(doc.verify(sk.public_key().as_ref()));
        assert_eq!(doc.name(), Some("Moki"));
        assert!(doc.time().is_some());
    }

    #[test]
    fn test_mutation_invalidates_signature() {
        let sk = EccPrivate::generate();
        let mut doc = Document::new(user_id(&sk, "moki"), PROFILE);
        doc.set_property("name", Value::from("Moki"));
        doc.sign(&sk).unwrap();

        doc.set_property("name", Value::from("Loki"));
        assert!(!doc.verify(sk.public_key().as_ref()));

        doc.sign(&sk).unwrap();
        assert!(doc.verify(sk.public_key().as_ref()));
    }

    #[test]
    fn test_resign_time_monotonic() {
        let sk = EccPrivate::generate();
        let mut doc = Document::new(user_id(&sk, "moki"), PROFILE);
        doc.set_property("name", Value::from("Moki"));
        doc.sign(&sk).unwrap();
        let first = doc.time().unwrap();
        doc.sign(&sk).unwrap();
        assert!(doc.time().unwrap() > first);
    }

    #[test]
    fn test_parse_roundtrip_preserves_signature() {
        let sk = EccPrivate::generate();
        let mut doc = Document::new(user_id(&sk, "moki"), VISA);
        doc.set_property("key", Value::Object(sk.public_key().to_dict()));
        doc.sign(&sk).unwrap();

        let parsed = Document::parse(doc.to_dict()).unwrap();
        assert!(parsed.verify(sk.public_key().as_ref()));

        let registry = CryptoRegistry::default();
        assert!(parsed.visa_key(&registry).is_some());
    }

    #[test]
    fn test_parse_requires_signature() {
        let sk = EccPrivate::generate();
        let doc = Document::new(user_id(&sk, "moki"), PROFILE);
        assert!(Document::parse(doc.to_dict()).is_err());
    }

    #[test]
    fn test_bulletin_fields() {
        let sk = EccPrivate::generate();
        let owner = user_id(&sk, "moki");
        let admin = user_id(&EccPrivate::generate(), "hulk");

        let group = ID::new(Some("club"), owner.address().clone(), None);
        let mut doc = Document::new(group, BULLETIN);
        doc.set_property("founder", Value::from(owner.to_string()));
        doc.set_property(
            "administrators",
            Value::from(vec![Value::from(admin.to_string())]),
        );
        doc.sign(&sk).unwrap();

        assert_eq!(doc.founder().unwrap(), owner);
        assert_eq!(doc.administrators(), vec![admin]);
        assert!(doc.assistants().is_empty());
    }
}
