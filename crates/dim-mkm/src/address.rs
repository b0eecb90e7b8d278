//! Self-certifying addresses.
//!
//! Two concrete encodings are supported:
//!
//! * BTC-style: `base58(network + ripemd160(sha256(F)) + checksum)` where
//!   `F` is the meta fingerprint (or the raw public key for seedless metas)
//!   and the checksum is the first 4 bytes of a double SHA-256.
//! * ETH-style: `0x` + the last 20 bytes of `keccak256(pubkey[1..])` in
//!   EIP-55 checksum casing.
//!
//! Two broadcast sentinels, `anywhere` and `everywhere`, name the
//! unauthenticated multicast destinations.

use std::fmt;

use dim_crypto::coder::{base58_decode, base58_encode, hex_encode};
use dim_crypto::digest::{keccak256, ripemd160, sha256};

use crate::error::MkmError;
use crate::network;

pub const ANYWHERE: &str = "anywhere";
pub const EVERYWHERE: &str = "everywhere";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// BTC-style base58 address with a network byte prefix.
    Btc { string: String, network: u8 },
    /// ETH-style hex address (user entities only).
    Eth { string: String },
    /// Broadcast destination for any user.
    Anywhere,
    /// Broadcast destination for any group.
    Everywhere,
}

impl Address {
    /// Parse an address string; recognizes broadcast sentinels, then BTC
    /// base58 (26..=35 chars), then ETH hex (42 chars).
    pub fn parse(text: &str) -> Result<Self, MkmError> {
        if text.eq_ignore_ascii_case(ANYWHERE) {
            return Ok(Self::Anywhere);
        }
        if text.eq_ignore_ascii_case(EVERYWHERE) {
            return Ok(Self::Everywhere);
        }
        match text.len() {
            26..=35 => Self::parse_btc(text),
            42 => Self::parse_eth(text),
            _ => Err(MkmError::InvalidFormat(format!("address: {text}"))),
        }
    }

    /// Derive a BTC-style address from fingerprint bytes.
    pub fn btc_from_data(fingerprint: &[u8], network: u8) -> Self {
        let digest = ripemd160(&sha256(fingerprint));
        let mut body = Vec::with_capacity(25);
        body.push(network);
        body.extend_from_slice(&digest);
        let code = check_code(&body);
        body.extend_from_slice(&code);
        Self::Btc {
            string: base58_encode(&body),
            network,
        }
    }

    /// Derive an ETH-style address from the uncompressed public key point
    /// (the leading 0x04 tag is stripped when present).
    pub fn eth_from_data(fingerprint: &[u8]) -> Result<Self, MkmError> {
        let point = match fingerprint.len() {
            65 => &fingerprint[1..],
            64 => fingerprint,
            n => return Err(MkmError::Key(format!("ETH key data length: {n}"))),
        };
        let digest = keccak256(point);
        let tail = &digest[digest.len() - 20..];
        Ok(Self::Eth {
            string: format!("0x{}", eip55(&hex_encode(tail))),
        })
    }

    fn parse_btc(text: &str) -> Result<Self, MkmError> {
        let data = base58_decode(text)
            .ok_or_else(|| MkmError::InvalidFormat(format!("base58: {text}")))?;
        if data.len() != 25 {
            return Err(MkmError::InvalidFormat(format!("address: {text}")));
        }
        let (body, code) = data.split_at(21);
        if check_code(body) != code {
            return Err(MkmError::ChecksumMismatch);
        }
        Ok(Self::Btc {
            string: text.to_owned(),
            network: body[0],
        })
    }

    fn parse_eth(text: &str) -> Result<Self, MkmError> {
        let hexpart = text
            .strip_prefix("0x")
            .ok_or_else(|| MkmError::InvalidFormat(format!("address: {text}")))?;
        if hexpart.len() != 40 || !hexpart.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MkmError::InvalidFormat(format!("address: {text}")));
        }
        let canonical = eip55(&hexpart.to_ascii_lowercase());
        if canonical != hexpart {
            return Err(MkmError::ChecksumMismatch);
        }
        Ok(Self::Eth {
            string: text.to_owned(),
        })
    }

    /// The entity type byte carried by this address.
    pub fn network(&self) -> u8 {
        match self {
            Self::Btc { network, .. } => *network,
            Self::Eth { .. } => network::USER,
            Self::Anywhere => network::USER,
            Self::Everywhere => network::GROUP,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Anywhere | Self::Everywhere)
    }

    pub fn is_user(&self) -> bool {
        network::is_user(self.network())
    }

    pub fn is_group(&self) -> bool {
        network::is_group(self.network())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Btc { string, .. } | Self::Eth { string } => f.write_str(string),
            Self::Anywhere => f.write_str(ANYWHERE),
            Self::Everywhere => f.write_str(EVERYWHERE),
        }
    }
}

fn check_code(body: &[u8]) -> Vec<u8> {
    sha256(&sha256(body))[..4].to_vec()
}

// EIP-55: uppercase a hex digit when the matching nibble of
// keccak256(lowercase address) is >= 8.
fn eip55(lower: &str) -> String {
    let table = keccak256(lower.as_bytes());
    lower
        .bytes()
        .enumerate()
        .map(|(i, ch)| {
            let nibble = if i % 2 == 0 {
                table[i / 2] >> 4
            } else {
                table[i / 2] & 0x0f
            };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                ch.to_ascii_uppercase() as char
            } else {
                ch as char
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btc_roundtrip() {
        let address = Address::btc_from_data(b"moky", network::USER);
        let text = address.to_string();
        let parsed = Address::parse(&text).unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.network(), network::USER);
        assert!(parsed.is_user());
        assert!(!parsed.is_broadcast());
    }

    #[test]
    fn test_btc_checksum_rejected() {
        let address = Address::btc_from_data(b"moky", network::USER).to_string();
        // corrupt one character, avoiding the base58 alphabet edge
        let mut bytes = address.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'2' { b'3' } else { b'2' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert!(Address::parse(&corrupted).is_err());
    }

    #[test]
    fn test_eth_eip55_casing() {
        let checksummed = "0x3E9003153d9A39D3f57B126b0c38513D5e289c3E";
        let parsed = Address::parse(checksummed).unwrap();
        assert_eq!(parsed.to_string(), checksummed);

        // wrong casing fails the checksum
        assert!(Address::parse("0x3e9003153d9a39d3f57b126b0c38513d5e289c3e").is_err());
    }

    #[test]
    fn test_broadcast_sentinels() {
        let anywhere = Address::parse("Anywhere").unwrap();
        assert!(anywhere.is_broadcast());
        assert!(anywhere.is_user());

        let everywhere = Address::parse("everywhere").unwrap();
        assert!(everywhere.is_broadcast());
        assert!(everywhere.is_group());
    }

    #[test]
    fn test_known_user_address_parses() {
        let parsed = Address::parse("4WDfe3zZ4T7opFSi3iDAKiuTnUHjxmXekk").unwrap();
        assert!(parsed.is_user());
        assert_eq!(parsed.network(), network::USER);
    }
}
