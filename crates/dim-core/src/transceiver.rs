//! The cryptographic message transforms.
//!
//! Sending: instant → secure (symmetric-encrypt the content, wrap the key
//! for each receiver) → reliable (sign the ciphertext). Receiving: reliable
//! → secure (verify the signature, saving any attached meta/visa first) →
//! instant (unwrap the key, decrypt, parse the content).
//!
//! Broadcast receivers short-circuit the key wrapping: their payload is
//! passed through in the clear and no `key`/`keys` field is emitted.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use dim_crypto::coder::{self, Dict};
use dim_crypto::SymmetricKey;
use dim_mkm::{Document, Meta, ID};

use crate::barrack::Barrack;
use crate::content::Content;
use crate::delegate::CipherKeyDelegate;
use crate::error::CoreError;
use crate::message::{InstantMessage, ReliableMessage, SecureMessage};
use crate::packer::MessageShortener;

pub struct Transceiver {
    barrack: Arc<Barrack>,
    key_cache: Arc<dyn CipherKeyDelegate>,
    shortener: MessageShortener,
}

impl Transceiver {
    pub fn new(barrack: Arc<Barrack>, key_cache: Arc<dyn CipherKeyDelegate>) -> Self {
        Self {
            barrack,
            key_cache,
            shortener: MessageShortener,
        }
    }

    pub fn barrack(&self) -> &Arc<Barrack> {
        &self.barrack
    }

    //
    //  Sending
    //

    /// Encrypt the content with the conversation key and wrap that key for
    /// every receiver.
    pub fn encrypt_message(&self, message: &InstantMessage) -> Result<SecureMessage, CoreError> {
        let sender = message.sender().clone();
        let receiver = message.receiver().clone();
        // group messages share one conversation key per group
        let target = message.group().unwrap_or_else(|| receiver.clone());

        let password = self
            .key_cache
            .cipher_key(&sender, &target, true)
            .ok_or_else(|| CoreError::KeyUnavailable(target.clone()))?;

        // content → shortened → canonical JSON → ciphertext; cipher
        // parameters (the IV) land next to the data in the message dictionary
        let body = coder::json_encode(
            &self
                .shortener
                .compress_content(message.content().as_dict().clone()),
        );
        let mut params = Dict::new();
        let ciphertext = password.encrypt(&body, &mut params)?;

        let mut dict = message.as_dict().clone();
        dict.remove("content");
        if target != receiver {
            // expose the group so receivers select the right conversation key
            dict.insert("group".into(), Value::from(target.to_string()));
        }
        for (field, value) in params {
            dict.insert(field, value);
        }
        if target.is_broadcast() {
            // pass-through: keep the payload readable, wrap nothing
            dict.insert(
                "data".into(),
                Value::from(String::from_utf8_lossy(&ciphertext).into_owned()),
            );
            return SecureMessage::parse(dict);
        }
        dict.insert(
            "data".into(),
            Value::from(coder::base64_encode(&ciphertext)),
        );

        let key_bytes = coder::json_encode(&self.shortener.compress_key(password.to_dict()));
        if receiver.is_group() {
            let members = self.barrack.members(&receiver);
            if members.is_empty() {
                return Err(CoreError::Transient(receiver));
            }
            let mut keys = Dict::new();
            for member in &members {
                match self.wrap_key(&key_bytes, member) {
                    Some(wrapped) => {
                        keys.insert(member.to_string(), Value::from(wrapped));
                    }
                    None => {
                        // visa not here yet; the member misses this round
                        warn!(%member, "no encryption key, skipping member");
                    }
                }
            }
            if keys.is_empty() {
                return Err(CoreError::KeyUnavailable(receiver));
            }
            dict.insert("keys".into(), Value::Object(keys));
        } else {
            let wrapped = self
                .wrap_key(&key_bytes, &receiver)
                .ok_or_else(|| CoreError::KeyUnavailable(receiver))?;
            dict.insert("key".into(), Value::from(wrapped));
        }
        SecureMessage::parse(dict)
    }

    fn wrap_key(&self, key_bytes: &[u8], receiver: &ID) -> Option<String> {
        let public_key = self.barrack.public_key_for_encryption(receiver)?;
        let wrapped = public_key.encrypt(key_bytes)?;
        Some(coder::base64_encode(&wrapped))
    }

    /// Sign the ciphertext with the sender's signature key.
    pub fn sign_message(&self, message: &SecureMessage) -> Result<ReliableMessage, CoreError> {
        let sender = message.sender();
        let private_key = self
            .barrack
            .private_key_for_signature(sender)
            .ok_or_else(|| CoreError::Unauthorized(format!("no signature key for {sender}")))?;
        let signature = private_key.sign(&message.data()?)?;

        let mut dict = message.as_dict().clone();
        dict.insert(
            "signature".into(),
            Value::from(coder::base64_encode(&signature)),
        );
        ReliableMessage::parse(dict)
    }

    //
    //  Receiving
    //

    /// Check the sender's signature over the ciphertext. Attached identity
    /// artifacts are saved first so first-contact messages verify.
    pub fn verify_message(&self, message: &ReliableMessage) -> Result<SecureMessage, CoreError> {
        let sender = message.sender();
        if let Some(meta) = message.meta() {
            if let Some(meta) = Meta::parse(meta, self.barrack.registry()) {
                self.barrack.save_meta(&meta, sender);
            }
        }
        if let Some(visa) = message.visa() {
            if let Ok(visa) = Document::parse(visa) {
                self.barrack.save_document(&visa);
            }
        }

        let keys = self.barrack.public_keys_for_verification(sender);
        if keys.is_empty() {
            debug!(%sender, "sender unknown, message parked");
            return Err(CoreError::Transient(sender.clone()));
        }
        let data = message.data()?;
        let signature = message.signature()?;
        if keys.iter().any(|key| key.verify(&data, &signature)) {
            Ok(message.to_secure())
        } else {
            Err(CoreError::SignatureInvalid)
        }
    }

    /// Unwrap the conversation key as local user `user` and decrypt the
    /// content. A successfully used key is cached for the conversation.
    pub fn decrypt_message(
        &self,
        message: &SecureMessage,
        user: &ID,
    ) -> Result<InstantMessage, CoreError> {
        let sender = message.sender().clone();
        let target = message
            .group()
            .unwrap_or_else(|| message.receiver().clone());

        let password = match message.wrapped_key_for(user) {
            Some(wrapped) => self.unwrap_key(&wrapped, user)?,
            None => self
                .key_cache
                .cipher_key(&sender, &target, false)
                .ok_or_else(|| CoreError::KeyUnavailable(sender.clone()))?,
        };

        let plaintext = password.decrypt(&message.data()?, message.as_dict())?;
        let content = coder::json_decode(&plaintext)
            .ok_or(CoreError::DecryptFailed)
            .and_then(|dict| Content::parse(self.shortener.expand_content(dict)))?;

        // the key proved itself, remember it for this conversation
        self.key_cache.cache_cipher_key(&sender, &target, password);

        let mut dict = message.as_dict().clone();
        for field in ["data", "key", "keys", "IV", "iv", "signature"] {
            dict.remove(field);
        }
        dict.insert("content".into(), Value::Object(content.into_dict()));
        InstantMessage::parse(dict)
    }

    fn unwrap_key(&self, wrapped: &[u8], user: &ID) -> Result<Arc<dyn SymmetricKey>, CoreError> {
        for private_key in self.barrack.private_keys_for_decryption(user) {
            let key_bytes = match private_key.decrypt(wrapped) {
                Some(key_bytes) => key_bytes,
                None => continue,
            };
            if let Some(key) = coder::json_decode(&key_bytes)
                .map(|dict| self.shortener.expand_key(dict))
                .and_then(|dict| self.barrack.registry().symmetric_parse(&dict))
            {
                return Ok(key);
            }
        }
        Err(CoreError::DecryptFailed)
    }
}
