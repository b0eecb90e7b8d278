//! The message triad: instant (cleartext), secure (encrypted) and reliable
//! (encrypted + signed).
//!
//! All three are views over one wire dictionary; transformation between
//! stages adds or removes fields but never rewrites ones it does not own,
//! so unknown keys survive the round trip. Sender, receiver and time are
//! validated once at the parse boundary.

use serde_json::Value;

use dim_crypto::coder::{self, Dict};
use dim_mkm::ID;

use crate::content::{now, valid_time, Content};
use crate::error::CoreError;

/// Typed header shared by all message stages.
#[derive(Clone)]
pub struct Envelope {
    pub sender: ID,
    pub receiver: ID,
    pub time: f64,
}

impl Envelope {
    pub fn new(sender: ID, receiver: ID) -> Self {
        Self {
            sender,
            receiver,
            time: now(),
        }
    }

    fn from_dict(dict: &Dict) -> Result<Self, CoreError> {
        let sender = coder::get_str(dict, "sender")
            .ok_or_else(|| CoreError::InvalidFormat("message without sender".into()))?;
        let receiver = coder::get_str(dict, "receiver")
            .ok_or_else(|| CoreError::InvalidFormat("message without receiver".into()))?;
        let time = coder::get_f64(dict, "time").unwrap_or_default();
        if !valid_time(time) {
            return Err(CoreError::InvalidFormat("message time out of range".into()));
        }
        Ok(Self {
            sender: ID::parse(sender)?,
            receiver: ID::parse(receiver)?,
            time,
        })
    }

    fn fill(&self, dict: &mut Dict) {
        dict.insert("sender".into(), Value::from(self.sender.to_string()));
        dict.insert("receiver".into(), Value::from(self.receiver.to_string()));
        dict.insert("time".into(), Value::from(self.time));
    }
}

/// Broadcast payloads stay readable on the wire: UTF-8 JSON instead of
/// base64 ciphertext.
fn is_broadcast(dict: &Dict, envelope: &Envelope) -> bool {
    if envelope.receiver.is_broadcast() {
        return true;
    }
    matches!(
        coder::get_str(dict, "group").and_then(|text| ID::parse(text).ok()),
        Some(group) if group.is_broadcast()
    )
}

fn decode_payload(dict: &Dict, envelope: &Envelope) -> Option<Vec<u8>> {
    let text = coder::get_str(dict, "data")?;
    if is_broadcast(dict, envelope) {
        Some(text.as_bytes().to_vec())
    } else {
        coder::base64_decode(text)
    }
}

/// Cleartext message: envelope + content.
#[derive(Clone)]
pub struct InstantMessage {
    dict: Dict,
    envelope: Envelope,
    content: Content,
}

impl InstantMessage {
    pub fn new(envelope: Envelope, content: Content) -> Self {
        let mut dict = Dict::new();
        envelope.fill(&mut dict);
        dict.insert("content".into(), Value::Object(content.as_dict().clone()));
        Self {
            dict,
            envelope,
            content,
        }
    }

    pub fn parse(dict: Dict) -> Result<Self, CoreError> {
        let envelope = Envelope::from_dict(&dict)?;
        let content = coder::get_dict(&dict, "content")
            .ok_or_else(|| CoreError::InvalidFormat("instant message without content".into()))?;
        let content = Content::parse(content.clone())?;
        Ok(Self {
            dict,
            envelope,
            content,
        })
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn sender(&self) -> &ID {
        &self.envelope.sender
    }

    pub fn receiver(&self) -> &ID {
        &self.envelope.receiver
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Group the content addresses, when this is a group message.
    pub fn group(&self) -> Option<ID> {
        self.content.group()
    }

    pub fn as_dict(&self) -> &Dict {
        &self.dict
    }

    pub fn into_dict(self) -> Dict {
        self.dict
    }
}

/// Encrypted message: envelope + ciphertext + wrapped key(s).
#[derive(Clone)]
pub struct SecureMessage {
    dict: Dict,
    envelope: Envelope,
}

impl SecureMessage {
    pub fn parse(dict: Dict) -> Result<Self, CoreError> {
        let envelope = Envelope::from_dict(&dict)?;
        if coder::get_str(&dict, "data").is_none() {
            return Err(CoreError::InvalidFormat("secure message without data".into()));
        }
        Ok(Self { dict, envelope })
    }

    pub(crate) fn from_dict_unchecked(dict: Dict, envelope: Envelope) -> Self {
        Self { dict, envelope }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn sender(&self) -> &ID {
        &self.envelope.sender
    }

    pub fn receiver(&self) -> &ID {
        &self.envelope.receiver
    }

    pub fn group(&self) -> Option<ID> {
        coder::get_str(&self.dict, "group").and_then(|text| ID::parse(text).ok())
    }

    /// The symmetric-encrypted content bytes (cleartext JSON bytes for
    /// broadcast messages).
    pub fn data(&self) -> Result<Vec<u8>, CoreError> {
        decode_payload(&self.dict, &self.envelope)
            .ok_or_else(|| CoreError::InvalidFormat("secure message data unreadable".into()))
    }

    /// Wrapped key addressed to `member`: their entry in `keys`, or the
    /// top-level `key` for 1:1 messages.
    pub fn wrapped_key_for(&self, member: &ID) -> Option<Vec<u8>> {
        if let Some(keys) = coder::get_dict(&self.dict, "keys") {
            if let Some(wrapped) = coder::get_str(keys, &member.to_string()) {
                return coder::base64_decode(wrapped);
            }
        }
        coder::get_bytes(&self.dict, "key")
    }

    pub fn as_dict(&self) -> &Dict {
        &self.dict
    }

    pub(crate) fn dict_mut(&mut self) -> &mut Dict {
        &mut self.dict
    }

    pub fn into_dict(self) -> Dict {
        self.dict
    }
}

/// Network message: secure message + sender signature over `data`.
#[derive(Clone)]
pub struct ReliableMessage {
    dict: Dict,
    envelope: Envelope,
}

impl ReliableMessage {
    pub fn parse(dict: Dict) -> Result<Self, CoreError> {
        let envelope = Envelope::from_dict(&dict)?;
        if coder::get_str(&dict, "data").is_none() {
            return Err(CoreError::InvalidFormat("reliable message without data".into()));
        }
        if coder::get_str(&dict, "signature").is_none() {
            return Err(CoreError::InvalidFormat(
                "reliable message without signature".into(),
            ));
        }
        Ok(Self { dict, envelope })
    }

    pub(crate) fn from_dict_unchecked(dict: Dict, envelope: Envelope) -> Self {
        Self { dict, envelope }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn sender(&self) -> &ID {
        &self.envelope.sender
    }

    pub fn receiver(&self) -> &ID {
        &self.envelope.receiver
    }

    pub fn group(&self) -> Option<ID> {
        coder::get_str(&self.dict, "group").and_then(|text| ID::parse(text).ok())
    }

    pub fn data(&self) -> Result<Vec<u8>, CoreError> {
        decode_payload(&self.dict, &self.envelope)
            .ok_or_else(|| CoreError::InvalidFormat("reliable message data unreadable".into()))
    }

    pub fn signature(&self) -> Result<Vec<u8>, CoreError> {
        coder::get_bytes(&self.dict, "signature")
            .ok_or_else(|| CoreError::InvalidFormat("signature unreadable".into()))
    }

    /// Meta inlined for first contact.
    pub fn meta(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "meta")
    }

    /// Visa inlined for first contact.
    pub fn visa(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "visa")
    }

    /// Strip down to the secure view (the signature stays in the dict but
    /// is no longer authoritative).
    pub fn to_secure(&self) -> SecureMessage {
        SecureMessage {
            dict: self.dict.clone(),
            envelope: self.envelope.clone(),
        }
    }

    pub fn as_dict(&self) -> &Dict {
        &self.dict
    }

    pub fn into_dict(self) -> Dict {
        self.dict
    }
}
