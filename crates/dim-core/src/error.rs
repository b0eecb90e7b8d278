use thiserror::Error;

use dim_crypto::CryptoError;
use dim_mkm::{MkmError, ID};

#[derive(Error, Debug)]
pub enum CoreError {
    /// Parse or validation failure on incoming data.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Sender signature does not match any of their verification keys.
    #[error("signature invalid")]
    SignatureInvalid,

    /// Wrapped key or payload failed to decrypt. Logged and dropped; never
    /// reported back to the sender.
    #[error("decrypt failed")]
    DecryptFailed,

    /// No encryption key available for a recipient.
    #[error("no encryption key for {0}")]
    KeyUnavailable(ID),

    /// Meta for this identifier has not been resolved.
    #[error("identifier unknown: {0}")]
    IdentifierUnknown(ID),

    /// Group operation without the necessary rights.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resolution pending; the message is parked and retried when the
    /// missing artifact arrives.
    #[error("resolution pending for {0}")]
    Transient(ID),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Mkm(#[from] MkmError),
}
