use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("signing failed: {0}")]
    SignFailed(String),

    #[error("invalid key data: {0}")]
    InvalidKey(String),

    #[error("missing cipher parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}
