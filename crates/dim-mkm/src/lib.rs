//! # dim-mkm
//!
//! Ming-Ke-Ming: self-certifying identity for the DIM client core.
//!
//! An entity is named by an [`ID`] (`name@address/terminal`) whose address is
//! derived from a [`Meta`] — the immutable proof binding a public key to the
//! identifier. Mutable attributes (profile fields, the visa encryption key,
//! group bulletins) live in signed [`Document`]s.

pub mod address;
pub mod document;
pub mod identifier;
pub mod meta;
pub mod network;

mod error;

pub use address::Address;
pub use document::Document;
pub use error::MkmError;
pub use identifier::ID;
pub use meta::Meta;
pub use network::EntityType;
