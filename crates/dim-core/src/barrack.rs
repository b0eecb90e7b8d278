//! Barrack: the identity resolver.
//!
//! Translates identifiers into entities and their artifacts (meta,
//! documents, keys, members). Reads come from in-memory caches first, then
//! the archivist; a miss may dispatch an asynchronous query, throttled per
//! identifier. Writes are conditional: metas must match their identifier,
//! documents must verify and be newer than what we hold.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use dim_crypto::{CryptoRegistry, PrivateKey, PublicKey};
use dim_mkm::{document, Document, Meta, ID};

use crate::checker::{FrequencyChecker, RecentTimeChecker, QUERY_EXPIRES};
use crate::content::now;
use crate::delegate::{Archivist, LocalUserDataSource};
use crate::entity::{dedup_keys, Entity, Group, User};

pub struct Barrack {
    registry: Arc<CryptoRegistry>,
    archivist: Arc<dyn Archivist>,
    custodian: Arc<dyn LocalUserDataSource>,

    // memory caches, replaced atomically on refresh
    entities: RwLock<HashMap<ID, Entity>>,
    metas: RwLock<HashMap<ID, Meta>>,
    documents: RwLock<HashMap<ID, Vec<Document>>>,
    encrypt_keys: RwLock<HashMap<ID, Arc<dyn PublicKey>>>,
    verify_keys: RwLock<HashMap<ID, Vec<Arc<dyn PublicKey>>>>,

    // query throttling
    meta_queries: FrequencyChecker<ID>,
    document_queries: FrequencyChecker<ID>,
    member_queries: FrequencyChecker<ID>,
    history_times: RecentTimeChecker<ID>,
}

impl Barrack {
    pub fn new(
        registry: Arc<CryptoRegistry>,
        archivist: Arc<dyn Archivist>,
        custodian: Arc<dyn LocalUserDataSource>,
    ) -> Self {
        Self {
            registry,
            archivist,
            custodian,
            entities: RwLock::new(HashMap::new()),
            metas: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            encrypt_keys: RwLock::new(HashMap::new()),
            verify_keys: RwLock::new(HashMap::new()),
            meta_queries: FrequencyChecker::new(QUERY_EXPIRES),
            document_queries: FrequencyChecker::new(QUERY_EXPIRES),
            member_queries: FrequencyChecker::new(QUERY_EXPIRES),
            history_times: RecentTimeChecker::new(),
        }
    }

    pub fn registry(&self) -> &CryptoRegistry {
        &self.registry
    }

    pub fn archivist(&self) -> &Arc<dyn Archivist> {
        &self.archivist
    }

    //
    //  Entities
    //

    pub fn user(&self, identifier: &ID) -> User {
        match self.entity(identifier) {
            Entity::User(user) => user,
            Entity::Group(group) => User::new(group.identifier().clone()),
        }
    }

    pub fn group(&self, identifier: &ID) -> Group {
        match self.entity(identifier) {
            Entity::Group(group) => group,
            Entity::User(user) => Group::new(user.identifier().clone()),
        }
    }

    pub fn entity(&self, identifier: &ID) -> Entity {
        if let Some(entity) = read(&self.entities).get(identifier) {
            return entity.clone();
        }
        let entity = if identifier.is_group() {
            Entity::Group(Group::new(identifier.clone()))
        } else {
            Entity::User(User::new(identifier.clone()))
        };
        write(&self.entities).insert(identifier.clone(), entity.clone());
        entity
    }

    //
    //  Meta
    //

    pub fn meta(&self, identifier: &ID) -> Option<Meta> {
        if let Some(meta) = read(&self.metas).get(identifier) {
            return Some(meta.clone());
        }
        match self.archivist.meta(identifier) {
            Some(meta) => {
                write(&self.metas).insert(identifier.clone(), meta.clone());
                Some(meta)
            }
            None => {
                self.query_meta(identifier);
                None
            }
        }
    }

    /// Dispatch a meta query unless throttled. Broadcast and local
    /// identifiers are never queried.
    pub fn query_meta(&self, identifier: &ID) -> bool {
        if identifier.is_broadcast() || self.is_local(identifier) {
            return false;
        }
        if !self.meta_queries.is_expired(identifier, now(), false) {
            return false;
        }
        debug!(%identifier, "querying meta");
        self.archivist.query_meta(identifier)
    }

    /// Conditional write: the meta must certify the identifier.
    pub fn save_meta(&self, meta: &Meta, identifier: &ID) -> bool {
        if !meta.match_identifier(identifier) {
            warn!(%identifier, "meta rejected: does not match identifier");
            return false;
        }
        if !self.archivist.save_meta(meta, identifier) {
            return false;
        }
        write(&self.metas).insert(identifier.clone(), meta.clone());
        self.invalidate_keys(identifier);
        true
    }

    //
    //  Documents
    //

    pub fn documents(&self, identifier: &ID) -> Vec<Document> {
        if let Some(documents) = read(&self.documents).get(identifier) {
            return documents.clone();
        }
        let documents = self.archivist.documents(identifier);
        if documents.is_empty() {
            self.query_documents(identifier, &[]);
            return documents;
        }
        write(&self.documents).insert(identifier.clone(), documents.clone());
        documents
    }

    /// Newest document, optionally restricted to one type.
    pub fn document(&self, identifier: &ID, doc_type: Option<&str>) -> Option<Document> {
        let mut best: Option<Document> = None;
        for candidate in self.documents(identifier) {
            if let Some(doc_type) = doc_type {
                if candidate.doc_type() != doc_type {
                    continue;
                }
            }
            let newer = match &best {
                Some(best) => candidate.time().unwrap_or_default()
                    > best.time().unwrap_or_default(),
                None => true,
            };
            if newer {
                best = Some(candidate);
            }
        }
        best
    }

    pub fn query_documents(&self, identifier: &ID, cached: &[Document]) -> bool {
        if identifier.is_broadcast() || self.is_local(identifier) {
            return false;
        }
        if !self.document_queries.is_expired(identifier, now(), false) {
            return false;
        }
        debug!(%identifier, "querying documents");
        self.archivist.query_documents(identifier, cached)
    }

    /// Conditional write: the document must verify against the holder's
    /// meta key and be newer than the cached copy of the same type.
    pub fn save_document(&self, document: &Document) -> bool {
        let identifier = document.identifier().clone();
        let meta = match self.meta(&identifier) {
            Some(meta) => meta,
            None => {
                debug!(%identifier, "document parked: meta unknown");
                return false;
            }
        };
        if !document.verify(meta.public_key().as_ref()) {
            warn!(%identifier, "document rejected: bad signature");
            return false;
        }
        if let Some(cached) = self.document(&identifier, Some(document.doc_type())) {
            if cached.time().unwrap_or_default() > document.time().unwrap_or_default() {
                debug!(%identifier, "document rejected: stale");
                return false;
            }
        }
        if !self.archivist.save_document(document) {
            return false;
        }
        let mut cache = write(&self.documents);
        let documents = cache.entry(identifier.clone()).or_default();
        documents.retain(|existing| existing.doc_type() != document.doc_type());
        documents.push(document.clone());
        drop(cache);
        self.invalidate_keys(&identifier);
        true
    }

    //
    //  Key selection
    //

    /// Key to wrap message keys for `identifier`: the visa key when
    /// published, else the meta key if its algorithm can encrypt.
    pub fn public_key_for_encryption(&self, identifier: &ID) -> Option<Arc<dyn PublicKey>> {
        if let Some(key) = read(&self.encrypt_keys).get(identifier) {
            return Some(key.clone());
        }
        let key = self
            .document(identifier, Some(document::VISA))
            .and_then(|visa| visa.visa_key(&self.registry))
            .or_else(|| {
                let key = self.meta(identifier)?.public_key();
                key.can_encrypt().then_some(key)
            });
        match key {
            Some(key) => {
                write(&self.encrypt_keys).insert(identifier.clone(), key.clone());
                Some(key)
            }
            None => {
                // maybe a visa exists that we have not fetched yet
                self.query_documents(identifier, &self.documents(identifier));
                None
            }
        }
    }

    /// All keys that may have signed for `identifier`, visa-derived first.
    pub fn public_keys_for_verification(&self, identifier: &ID) -> Vec<Arc<dyn PublicKey>> {
        if let Some(keys) = read(&self.verify_keys).get(identifier) {
            return keys.clone();
        }
        let mut keys: Vec<Arc<dyn PublicKey>> = Vec::new();
        if let Some(key) = self
            .document(identifier, Some(document::VISA))
            .and_then(|visa| visa.visa_key(&self.registry))
        {
            keys.push(key);
        }
        if let Some(meta) = self.meta(identifier) {
            keys.push(meta.public_key());
        }
        let keys = dedup_keys(keys);
        if !keys.is_empty() {
            write(&self.verify_keys).insert(identifier.clone(), keys.clone());
        }
        keys
    }

    fn invalidate_keys(&self, identifier: &ID) {
        write(&self.encrypt_keys).remove(identifier);
        write(&self.verify_keys).remove(identifier);
    }

    //
    //  Local-user custodian delegation
    //

    pub fn local_users(&self) -> Vec<ID> {
        self.custodian.local_users()
    }

    pub fn is_local(&self, identifier: &ID) -> bool {
        self.custodian.local_users().contains(identifier)
    }

    pub fn contacts(&self, user: &ID) -> Vec<ID> {
        self.custodian.contacts(user)
    }

    pub fn private_keys_for_decryption(&self, user: &ID) -> Vec<Arc<dyn PrivateKey>> {
        self.custodian.private_keys_for_decryption(user)
    }

    pub fn private_key_for_signature(&self, user: &ID) -> Option<Arc<dyn PrivateKey>> {
        self.custodian.private_key_for_signature(user)
    }

    pub fn private_key_for_visa_signature(&self, user: &ID) -> Option<Arc<dyn PrivateKey>> {
        self.custodian.private_key_for_visa_signature(user)
    }

    //
    //  Groups
    //

    pub fn members(&self, group: &ID) -> Vec<ID> {
        let members = self.archivist.members(group);
        if members.is_empty() {
            self.query_members(group, &members);
        }
        members
    }

    pub fn query_members(&self, group: &ID, cached: &[ID]) -> bool {
        if group.is_broadcast() {
            return false;
        }
        if !self.member_queries.is_expired(group, now(), false) {
            return false;
        }
        debug!(%group, "querying members");
        self.archivist.query_members(group, cached)
    }

    /// Group owner: the bulletin's founder, else the first member.
    pub fn owner(&self, group: &ID) -> Option<ID> {
        if let Some(founder) = self
            .document(group, Some(document::BULLETIN))
            .and_then(|bulletin| bulletin.founder())
        {
            return Some(founder);
        }
        self.archivist.members(group).into_iter().next()
    }

    pub fn administrators(&self, group: &ID) -> Vec<ID> {
        self.document(group, Some(document::BULLETIN))
            .map(|bulletin| bulletin.administrators())
            .unwrap_or_default()
    }

    /// Track group history times so stale resets are detectable.
    pub fn record_history_time(&self, group: &ID, time: f64) -> bool {
        self.history_times.set_last_time(group, time)
    }

    pub fn is_history_expired(&self, group: &ID, time: f64) -> bool {
        self.history_times.is_expired(group, time)
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
