//! Message digests used by address derivation and signing.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// RIPEMD-160 digest (BTC-style address derivation).
pub fn ripemd160(data: &[u8]) -> Vec<u8> {
    Ripemd160::digest(data).to_vec()
}

/// Keccak-256 digest (ETH-style address derivation). This is the original
/// Keccak, not NIST SHA3-256.
pub fn keccak256(data: &[u8]) -> Vec<u8> {
    Keccak256::digest(data).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_vectors() {
        assert_eq!(
            hex::encode(keccak256(b"moky")),
            "96b07f3103d45cc7df2dd6e597922a17f48c86257dffe790d442bbd1ff46514d"
        );
        assert_eq!(
            hex::encode(keccak256(b"abc")),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_sha256_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ripemd160_of_sha256() {
        // hash160 of an empty input, well-known BTC vector
        let digest = ripemd160(&sha256(b""));
        assert_eq!(hex::encode(digest), "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb");
    }
}
