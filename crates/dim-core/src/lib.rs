//! # dim-core
//!
//! The DIM client core: a bidirectional pipeline turning user content into
//! wire-ready ciphertext and back.
//!
//! Sending: content → [`Transceiver::encrypt_message`] → secure message →
//! [`Transceiver::sign_message`] → reliable message → [`Packer::serialize`]
//! → bytes. Receiving runs the same stages in reverse and hands the
//! decrypted content to the [`Processor`], whose content-processing units
//! may produce response contents that re-enter the send path.
//!
//! Identity resolution ([`Barrack`]) and the per-conversation key cache
//! ([`KeyStore`]) back the pipeline; storage and networking stay behind the
//! [`Archivist`] and [`LocalUserDataSource`] traits implemented by the host.

pub mod barrack;
pub mod checker;
pub mod command;
pub mod content;
pub mod cpu;
pub mod delegate;
pub mod entity;
pub mod keystore;
pub mod message;
pub mod messenger;
pub mod packer;
pub mod processor;
pub mod transceiver;

mod error;

#[cfg(test)]
pub(crate) mod testutil;

pub use barrack::Barrack;
pub use command::Command;
pub use content::Content;
pub use delegate::{Archivist, CipherKeyDelegate, KeyRepository, LocalUserDataSource};
pub use error::CoreError;
pub use keystore::KeyStore;
pub use message::{Envelope, InstantMessage, ReliableMessage, SecureMessage};
pub use messenger::Messenger;
pub use packer::{MessageShortener, Packer};
pub use processor::{ContentProcessor, Processor};
pub use transceiver::Transceiver;
