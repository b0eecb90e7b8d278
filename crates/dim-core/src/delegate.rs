//! Capability traits implemented by the host application.
//!
//! The core holds external collaborators only through these interfaces:
//! persistent entity storage and network lookup ([`Archivist`]), the local
//! private-key custodian ([`LocalUserDataSource`]), conversation key caching
//! ([`CipherKeyDelegate`]) and key-map persistence ([`KeyRepository`]).

use std::sync::Arc;

use dim_crypto::{Dict, PrivateKey, SymmetricKey};
use dim_mkm::{Document, Meta, ID};

/// Entity data access and asynchronous lookup dispatch.
///
/// The `query_*` methods MAY enqueue a network request; they return `true`
/// only when a request was actually dispatched, so callers can apply
/// backoff. Results arrive later through `save_meta`/`save_document` and
/// `save_members`.
pub trait Archivist: Send + Sync {
    fn save_meta(&self, meta: &Meta, identifier: &ID) -> bool;

    fn save_document(&self, document: &Document) -> bool;

    fn meta(&self, identifier: &ID) -> Option<Meta>;

    fn documents(&self, identifier: &ID) -> Vec<Document>;

    /// Current member list of a group, owner first.
    fn members(&self, group: &ID) -> Vec<ID>;

    fn save_members(&self, group: &ID, members: &[ID]) -> bool;

    /// Signing time of the newest group history we hold.
    fn last_group_history_time(&self, group: &ID) -> Option<f64>;

    fn query_meta(&self, identifier: &ID) -> bool;

    fn query_documents(&self, identifier: &ID, cached: &[Document]) -> bool;

    fn query_members(&self, group: &ID, cached: &[ID]) -> bool;
}

/// The local-user private-key custodian. Private keys never enter the core;
/// it only asks the custodian to use them.
pub trait LocalUserDataSource: Send + Sync {
    fn local_users(&self) -> Vec<ID>;

    fn contacts(&self, user: &ID) -> Vec<ID>;

    /// Decrypt keys, newest first.
    fn private_keys_for_decryption(&self, user: &ID) -> Vec<Arc<dyn PrivateKey>>;

    fn private_key_for_signature(&self, user: &ID) -> Option<Arc<dyn PrivateKey>>;

    fn private_key_for_visa_signature(&self, user: &ID) -> Option<Arc<dyn PrivateKey>>;
}

/// Conversation key cache consulted by the transceiver.
pub trait CipherKeyDelegate: Send + Sync {
    /// Key for `sender` → `receiver`; a fresh one is created when `generate`
    /// is set and nothing is cached. Broadcast receivers always get the
    /// plaintext pass-through key.
    fn cipher_key(
        &self,
        sender: &ID,
        receiver: &ID,
        generate: bool,
    ) -> Option<Arc<dyn SymmetricKey>>;

    /// Cache the key delivered with a received message.
    fn cache_cipher_key(&self, sender: &ID, receiver: &ID, key: Arc<dyn SymmetricKey>);
}

/// Persistence hooks for the key store's map.
pub trait KeyRepository: Send + Sync {
    fn save_keys(&self, key_map: &Dict) -> bool;

    fn load_keys(&self) -> Option<Dict>;
}
