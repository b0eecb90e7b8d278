//! Message content: a tagged sum type over dictionary-backed views.
//!
//! Every content dictionary carries a `type` byte, a non-zero random serial
//! `sn` (unique per sender) and a `time` in fractional seconds. Unknown
//! types fall through to [`RawContent`], preserving the original map so the
//! bytes can be forwarded untouched.

use rand::RngCore;
use serde_json::Value;

use dim_crypto::coder::{self, Dict};
use dim_mkm::ID;

use crate::command::Command;
use crate::error::CoreError;
use crate::message::ReliableMessage;

/// Content type bytes.
pub mod content_type {
    pub const TEXT: u8 = 0x01;
    pub const FILE: u8 = 0x10;
    pub const IMAGE: u8 = 0x12;
    pub const AUDIO: u8 = 0x14;
    pub const VIDEO: u8 = 0x16;
    pub const COMMAND: u8 = 0x88;
    pub const HISTORY: u8 = 0x89;
    pub const ARRAY: u8 = 0xCA;
    pub const CUSTOMIZED: u8 = 0xCC;
    pub const FORWARD: u8 = 0xFF;
}

/// Fresh content dictionary with type, serial and time filled in.
pub(crate) fn new_content_dict(ty: u8) -> Dict {
    let mut dict = Dict::new();
    dict.insert("type".into(), Value::from(ty));
    dict.insert("sn".into(), Value::from(new_serial()));
    dict.insert("time".into(), Value::from(now()));
    dict
}

/// Non-zero random 32-bit serial.
fn new_serial() -> u32 {
    loop {
        let sn = rand::rngs::OsRng.next_u32();
        if sn != 0 {
            return sn;
        }
    }
}

pub(crate) fn now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Factory-boundary check shared by contents and envelopes: seconds since
/// epoch, finite and non-negative.
pub(crate) fn valid_time(time: f64) -> bool {
    time.is_finite() && time >= 0.0
}

#[derive(Clone)]
pub enum Content {
    Text(TextContent),
    /// File, image, audio and video share one shape; the type byte tells
    /// them apart.
    File(FileContent),
    Forward(ForwardContent),
    Array(ArrayContent),
    Command(Command),
    History(Command),
    Customized(CustomizedContent),
    Raw(RawContent),
}

impl Content {
    pub fn text(text: &str) -> Self {
        Self::Text(TextContent::new(text))
    }

    /// Parse a decrypted content dictionary, enforcing the serial and time
    /// invariants at the boundary.
    pub fn parse(dict: Dict) -> Result<Self, CoreError> {
        let ty = coder::get_u8(&dict, "type")
            .ok_or_else(|| CoreError::InvalidFormat("content without type".into()))?;
        let sn = coder::get_u64(&dict, "sn")
            .ok_or_else(|| CoreError::InvalidFormat("content without sn".into()))?;
        if sn == 0 || sn > u32::MAX as u64 {
            return Err(CoreError::InvalidFormat("content sn out of range".into()));
        }
        if let Some(time) = coder::get_f64(&dict, "time") {
            if !valid_time(time) {
                return Err(CoreError::InvalidFormat("content time out of range".into()));
            }
        }
        Ok(match ty {
            content_type::TEXT => Self::Text(TextContent { dict }),
            content_type::FILE | content_type::IMAGE | content_type::AUDIO
            | content_type::VIDEO => Self::File(FileContent { dict }),
            content_type::FORWARD => Self::Forward(ForwardContent { dict }),
            content_type::ARRAY => Self::Array(ArrayContent { dict }),
            content_type::COMMAND => Self::Command(Command::parse(dict)?),
            content_type::HISTORY => Self::History(Command::parse(dict)?),
            content_type::CUSTOMIZED => Self::Customized(CustomizedContent { dict }),
            _ => Self::Raw(RawContent { dict }),
        })
    }

    pub fn as_dict(&self) -> &Dict {
        match self {
            Self::Text(c) => &c.dict,
            Self::File(c) => &c.dict,
            Self::Forward(c) => &c.dict,
            Self::Array(c) => &c.dict,
            Self::Command(c) | Self::History(c) => c.as_dict(),
            Self::Customized(c) => &c.dict,
            Self::Raw(c) => &c.dict,
        }
    }

    pub fn into_dict(self) -> Dict {
        match self {
            Self::Text(c) => c.dict,
            Self::File(c) => c.dict,
            Self::Forward(c) => c.dict,
            Self::Array(c) => c.dict,
            Self::Command(c) | Self::History(c) => c.into_dict(),
            Self::Customized(c) => c.dict,
            Self::Raw(c) => c.dict,
        }
    }

    pub fn content_type(&self) -> u8 {
        coder::get_u8(self.as_dict(), "type").unwrap_or_default()
    }

    pub fn sn(&self) -> u32 {
        coder::get_u64(self.as_dict(), "sn").unwrap_or_default() as u32
    }

    pub fn time(&self) -> Option<f64> {
        coder::get_f64(self.as_dict(), "time")
    }

    /// Group this content addresses, for group messages.
    pub fn group(&self) -> Option<ID> {
        coder::get_str(self.as_dict(), "group")
            .and_then(|text| ID::parse(text).ok())
    }

    fn dict_mut(&mut self) -> &mut Dict {
        match self {
            Self::Text(c) => &mut c.dict,
            Self::File(c) => &mut c.dict,
            Self::Forward(c) => &mut c.dict,
            Self::Array(c) => &mut c.dict,
            Self::Command(c) | Self::History(c) => c.dict_mut(),
            Self::Customized(c) => &mut c.dict,
            Self::Raw(c) => &mut c.dict,
        }
    }

    pub fn set_group(&mut self, group: &ID) {
        self.dict_mut()
            .insert("group".into(), Value::from(group.to_string()));
    }
}

#[derive(Clone)]
pub struct TextContent {
    pub(crate) dict: Dict,
}

impl TextContent {
    pub fn new(text: &str) -> Self {
        let mut dict = new_content_dict(content_type::TEXT);
        dict.insert("text".into(), Value::from(text));
        Self { dict }
    }

    pub fn text(&self) -> &str {
        coder::get_str(&self.dict, "text").unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct FileContent {
    pub(crate) dict: Dict,
}

impl FileContent {
    /// `ty` is one of FILE/IMAGE/AUDIO/VIDEO.
    pub fn new(ty: u8, filename: &str) -> Self {
        let mut dict = new_content_dict(ty);
        dict.insert("filename".into(), Value::from(filename));
        Self { dict }
    }

    pub fn filename(&self) -> Option<&str> {
        coder::get_str(&self.dict, "filename")
    }

    /// Download location of the encrypted attachment.
    pub fn url(&self) -> Option<&str> {
        coder::get_str(&self.dict, "URL")
    }

    pub fn set_url(&mut self, url: &str) {
        self.dict.insert("URL".into(), Value::from(url));
    }

    /// Inline ciphertext, when the attachment is small enough to embed.
    pub fn data(&self) -> Option<Vec<u8>> {
        coder::get_bytes(&self.dict, "data")
    }

    pub fn set_data(&mut self, data: &[u8]) {
        self.dict
            .insert("data".into(), Value::from(coder::base64_encode(data)));
    }

    /// The symmetric key dictionary that decrypts the attachment.
    pub fn password(&self) -> Option<&Dict> {
        coder::get_dict(&self.dict, "password")
    }

    pub fn set_password(&mut self, key: Dict) {
        self.dict.insert("password".into(), Value::Object(key));
    }
}

#[derive(Clone)]
pub struct ForwardContent {
    pub(crate) dict: Dict,
}

impl ForwardContent {
    pub fn new(message: &ReliableMessage) -> Self {
        let mut dict = new_content_dict(content_type::FORWARD);
        dict.insert("forward".into(), Value::Object(message.as_dict().clone()));
        Self { dict }
    }

    /// The nested reliable message to re-inject into the receive pipeline.
    pub fn forward(&self) -> Result<ReliableMessage, CoreError> {
        let nested = coder::get_dict(&self.dict, "forward")
            .ok_or_else(|| CoreError::InvalidFormat("forward content empty".into()))?;
        ReliableMessage::parse(nested.clone())
    }
}

#[derive(Clone)]
pub struct ArrayContent {
    pub(crate) dict: Dict,
}

impl ArrayContent {
    pub fn new(contents: &[Content]) -> Self {
        let mut dict = new_content_dict(content_type::ARRAY);
        let items: Vec<Value> = contents
            .iter()
            .map(|content| Value::Object(content.as_dict().clone()))
            .collect();
        dict.insert("contents".into(), Value::from(items));
        Self { dict }
    }

    pub fn contents(&self) -> Vec<Content> {
        match self.dict.get("contents").and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|dict| Content::parse(dict.clone()).ok())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct CustomizedContent {
    pub(crate) dict: Dict,
}

impl CustomizedContent {
    pub fn new(app: &str, module: &str, action: &str) -> Self {
        let mut dict = new_content_dict(content_type::CUSTOMIZED);
        dict.insert("app".into(), Value::from(app));
        dict.insert("mod".into(), Value::from(module));
        dict.insert("act".into(), Value::from(action));
        Self { dict }
    }

    pub fn app(&self) -> &str {
        coder::get_str(&self.dict, "app").unwrap_or_default()
    }

    pub fn module(&self) -> &str {
        coder::get_str(&self.dict, "mod").unwrap_or_default()
    }

    pub fn action(&self) -> &str {
        coder::get_str(&self.dict, "act").unwrap_or_default()
    }
}

/// Unknown content type; the map is preserved verbatim.
#[derive(Clone)]
pub struct RawContent {
    pub(crate) dict: Dict,
}

impl RawContent {
    pub fn as_dict(&self) -> &Dict {
        &self.dict
    }
}
