//! Transport coders and canonical JSON.
//!
//! Signed regions of the protocol are canonical JSON: UTF-8, object keys
//! sorted lexicographically, no insignificant whitespace. `serde_json`
//! without the `preserve_order` feature stores objects in a `BTreeMap`, so
//! encoding a [`Dict`] with [`json_encode`] is canonical by construction.
//! All signed bytes in this workspace go through this module.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// A JSON object; the backing store for every dictionary-backed protocol
/// type (keys, metas, documents, messages, contents).
pub type Dict = serde_json::Map<String, Value>;

pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn base64_decode(text: &str) -> Option<Vec<u8>> {
    BASE64.decode(text.trim()).ok()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(text: &str) -> Option<Vec<u8>> {
    bs58::decode(text).into_vec().ok()
}

pub fn hex_encode(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn hex_decode(text: &str) -> Option<Vec<u8>> {
    hex::decode(text).ok()
}

pub fn utf8_encode(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

pub fn utf8_decode(data: &[u8]) -> Option<String> {
    String::from_utf8(data.to_vec()).ok()
}

/// Encode a dictionary as canonical JSON bytes.
pub fn json_encode(dict: &Dict) -> Vec<u8> {
    // Map is BTreeMap-backed: keys already sorted; to_string is compact.
    serde_json::to_string(dict)
        .map(String::into_bytes)
        .unwrap_or_default()
}

/// Decode JSON bytes into a dictionary. Non-object payloads are rejected.
pub fn json_decode(data: &[u8]) -> Option<Dict> {
    match serde_json::from_slice::<Value>(data) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

//
//  Typed accessors shared by all dictionary-backed types
//

pub fn get_str<'a>(dict: &'a Dict, key: &str) -> Option<&'a str> {
    dict.get(key).and_then(Value::as_str)
}

pub fn get_f64(dict: &Dict, key: &str) -> Option<f64> {
    dict.get(key).and_then(Value::as_f64)
}

pub fn get_u64(dict: &Dict, key: &str) -> Option<u64> {
    dict.get(key).and_then(Value::as_u64)
}

pub fn get_u8(dict: &Dict, key: &str) -> Option<u8> {
    get_u64(dict, key).and_then(|n| u8::try_from(n).ok())
}

pub fn get_dict<'a>(dict: &'a Dict, key: &str) -> Option<&'a Dict> {
    dict.get(key).and_then(Value::as_object)
}

/// Read a base64-encoded binary field.
pub fn get_bytes(dict: &Dict, key: &str) -> Option<Vec<u8>> {
    get_str(dict, key).and_then(base64_decode)
}
