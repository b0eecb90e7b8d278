//! Wire packing: reliable message ↔ bytes.
//!
//! Serialization is canonical JSON with single-letter field aliases to trim
//! the envelope. Aliasing happens outside the signed region: the signature
//! covers the ciphertext bytes only, so renaming top-level fields (or the
//! content fields before encryption) never invalidates it, as long as both
//! ends shorten and restore symmetrically.
//!
//! The packer also handles first contact: until a peer has been heard from,
//! every outgoing message carries the sender's meta and visa inline so the
//! receiver can verify it without a lookup round-trip.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use dim_crypto::coder::{self, Dict};
use dim_mkm::{document, ID};

use crate::barrack::Barrack;
use crate::error::CoreError;
use crate::message::ReliableMessage;

/// Field-alias tables. Compression moves a long field to its short form
/// when the short form is free; expansion is the exact inverse.
#[derive(Default, Clone, Copy)]
pub struct MessageShortener;

const CONTENT_ALIASES: &[(&str, &str)] = &[
    ("type", "T"),
    ("sn", "N"),
    ("time", "W"),
    ("group", "G"),
];

const KEY_ALIASES: &[(&str, &str)] = &[("algorithm", "A"), ("data", "D"), ("iv", "I")];

const MESSAGE_ALIASES: &[(&str, &str)] = &[
    ("sender", "F"),
    ("receiver", "R"),
    ("time", "W"),
    ("type", "T"),
    ("group", "G"),
    ("data", "D"),
    ("signature", "V"),
    ("meta", "M"),
    ("visa", "P"),
];

fn shift(dict: &mut Dict, from: &str, to: &str) {
    if dict.contains_key(to) {
        return;
    }
    if let Some(value) = dict.remove(from) {
        dict.insert(to.into(), value);
    }
}

impl MessageShortener {
    pub fn compress_content(&self, mut dict: Dict) -> Dict {
        for (long, short) in CONTENT_ALIASES {
            shift(&mut dict, long, short);
        }
        dict
    }

    pub fn expand_content(&self, mut dict: Dict) -> Dict {
        for (long, short) in CONTENT_ALIASES {
            shift(&mut dict, short, long);
        }
        dict
    }

    pub fn compress_key(&self, mut dict: Dict) -> Dict {
        for (long, short) in KEY_ALIASES {
            shift(&mut dict, long, short);
        }
        dict
    }

    pub fn expand_key(&self, mut dict: Dict) -> Dict {
        for (long, short) in KEY_ALIASES {
            shift(&mut dict, short, long);
        }
        dict
    }

    pub fn compress_message(&self, mut dict: Dict) -> Dict {
        for (long, short) in MESSAGE_ALIASES {
            shift(&mut dict, long, short);
        }
        // `key` (1:1) and `keys` (group) share one alias; the value shape
        // tells them apart on expansion
        shift(&mut dict, "keys", "K");
        shift(&mut dict, "key", "K");
        dict
    }

    pub fn expand_message(&self, mut dict: Dict) -> Dict {
        for (long, short) in MESSAGE_ALIASES {
            shift(&mut dict, short, long);
        }
        if let Some(wrapped) = dict.remove("K") {
            let field = if wrapped.is_object() { "keys" } else { "key" };
            if !dict.contains_key(field) {
                dict.insert(field.into(), wrapped);
            }
        }
        dict
    }
}

pub struct Packer {
    barrack: Arc<Barrack>,
    shortener: MessageShortener,
    // peers we have heard from; they no longer need our meta/visa inline
    acked: Mutex<HashSet<ID>>,
}

impl Packer {
    pub fn new(barrack: Arc<Barrack>) -> Self {
        Self {
            barrack,
            shortener: MessageShortener,
            acked: Mutex::new(HashSet::new()),
        }
    }

    /// Stop attaching identity artifacts to messages for `peer`.
    pub fn mark_acked(&self, peer: &ID) {
        self.lock_acked().insert(peer.clone());
    }

    fn is_acked(&self, peer: &ID) -> bool {
        self.lock_acked().contains(peer)
    }

    fn lock_acked(&self) -> std::sync::MutexGuard<'_, HashSet<ID>> {
        match self.acked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reliable message → wire bytes, attaching meta/visa on first contact.
    pub fn serialize(&self, message: &ReliableMessage) -> Vec<u8> {
        let mut dict = message.as_dict().clone();
        let receiver = message.receiver();
        if !receiver.is_broadcast() && !self.is_acked(receiver) {
            self.attach_identity(&mut dict, message.sender());
        }
        coder::json_encode(&self.shortener.compress_message(dict))
    }

    fn attach_identity(&self, dict: &mut Dict, sender: &ID) {
        if !dict.contains_key("meta") {
            if let Some(meta) = self.barrack.meta(sender) {
                debug!(%sender, "attaching meta for first contact");
                dict.insert("meta".into(), Value::Object(meta.to_dict().clone()));
            }
        }
        if !dict.contains_key("visa") {
            if let Some(visa) = self.barrack.document(sender, Some(document::VISA)) {
                dict.insert("visa".into(), Value::Object(visa.to_dict().clone()));
            }
        }
    }

    /// Wire bytes → reliable message.
    pub fn deserialize(&self, data: &[u8]) -> Result<ReliableMessage, CoreError> {
        let dict = coder::json_decode(data)
            .ok_or_else(|| CoreError::InvalidFormat("packet is not a JSON object".into()))?;
        ReliableMessage::parse(self.shortener.expand_message(dict))
    }
}
