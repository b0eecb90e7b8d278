use thiserror::Error;

#[derive(Error, Debug)]
pub enum MkmError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("checksum mismatch in address")]
    ChecksumMismatch,

    #[error("unsupported meta type: {0}")]
    UnsupportedMetaType(u8),

    #[error("key error: {0}")]
    Key(String),
}
