//! In-memory collaborators shared by the pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dim_crypto::rsa::RsaPrivate;
use dim_crypto::{CryptoRegistry, PrivateKey};
use dim_mkm::meta::meta_type;
use dim_mkm::{Document, Meta, ID};

use crate::barrack::Barrack;
use crate::delegate::{Archivist, LocalUserDataSource};
use crate::keystore::KeyStore;

#[derive(Default)]
pub(crate) struct MemoryArchivist {
    pub metas: Mutex<HashMap<ID, Meta>>,
    pub documents: Mutex<HashMap<ID, Vec<Document>>>,
    pub members: Mutex<HashMap<ID, Vec<ID>>>,
    pub queries: Mutex<Vec<String>>,
}

impl Archivist for MemoryArchivist {
    fn save_meta(&self, meta: &Meta, identifier: &ID) -> bool {
        self.metas
            .lock()
            .unwrap()
            .insert(identifier.clone(), meta.clone());
        true
    }

    fn save_document(&self, document: &Document) -> bool {
        let mut map = self.documents.lock().unwrap();
        let list = map.entry(document.identifier().clone()).or_default();
        list.retain(|existing| existing.doc_type() != document.doc_type());
        list.push(document.clone());
        true
    }

    fn meta(&self, identifier: &ID) -> Option<Meta> {
        self.metas.lock().unwrap().get(identifier).cloned()
    }

    fn documents(&self, identifier: &ID) -> Vec<Document> {
        self.documents
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    fn members(&self, group: &ID) -> Vec<ID> {
        self.members
            .lock()
            .unwrap()
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    fn save_members(&self, group: &ID, members: &[ID]) -> bool {
        self.members
            .lock()
            .unwrap()
            .insert(group.clone(), members.to_vec());
        true
    }

    fn last_group_history_time(&self, _group: &ID) -> Option<f64> {
        None
    }

    fn query_meta(&self, identifier: &ID) -> bool {
        self.queries
            .lock()
            .unwrap()
            .push(format!("meta:{identifier}"));
        true
    }

    fn query_documents(&self, identifier: &ID, _cached: &[Document]) -> bool {
        self.queries
            .lock()
            .unwrap()
            .push(format!("documents:{identifier}"));
        true
    }

    fn query_members(&self, group: &ID, _cached: &[ID]) -> bool {
        self.queries.lock().unwrap().push(format!("members:{group}"));
        true
    }
}

#[derive(Default)]
pub(crate) struct MemoryCustodian {
    pub users: Vec<ID>,
    pub keys: HashMap<ID, Arc<dyn PrivateKey>>,
    pub contacts: HashMap<ID, Vec<ID>>,
}

impl LocalUserDataSource for MemoryCustodian {
    fn local_users(&self) -> Vec<ID> {
        self.users.clone()
    }

    fn contacts(&self, user: &ID) -> Vec<ID> {
        self.contacts.get(user).cloned().unwrap_or_default()
    }

    fn private_keys_for_decryption(&self, user: &ID) -> Vec<Arc<dyn PrivateKey>> {
        self.keys.get(user).cloned().into_iter().collect()
    }

    fn private_key_for_signature(&self, user: &ID) -> Option<Arc<dyn PrivateKey>> {
        self.keys.get(user).cloned()
    }

    fn private_key_for_visa_signature(&self, user: &ID) -> Option<Arc<dyn PrivateKey>> {
        self.keys.get(user).cloned()
    }
}

/// A fresh RSA-keyed user with its identity proof.
pub(crate) fn rsa_user(name: &str) -> (ID, Arc<dyn PrivateKey>, Meta) {
    let sk: Arc<dyn PrivateKey> = Arc::new(RsaPrivate::generate().unwrap());
    let meta = Meta::generate(meta_type::MKM, sk.as_ref(), Some(name)).unwrap();
    let address = meta.generate_address(dim_mkm::network::USER).unwrap();
    let id = ID::new(Some(name), address, None);
    (id, sk, meta)
}

pub(crate) struct Facility {
    pub barrack: Arc<Barrack>,
    pub keystore: Arc<KeyStore>,
    pub archivist: Arc<MemoryArchivist>,
}

/// Wire up a barrack and key store around in-memory storage. `locals` maps
/// each local user to their private key; remote metas go straight into the
/// archivist.
pub(crate) fn facility(
    locals: Vec<(ID, Arc<dyn PrivateKey>, Meta)>,
    remotes: Vec<(ID, Meta)>,
) -> Facility {
    let registry = Arc::new(CryptoRegistry::default());
    let archivist = Arc::new(MemoryArchivist::default());
    let mut custodian = MemoryCustodian::default();
    for (id, sk, meta) in locals {
        archivist.save_meta(&meta, &id);
        custodian.users.push(id.clone());
        custodian.keys.insert(id, sk);
    }
    for (id, meta) in remotes {
        archivist.save_meta(&meta, &id);
    }
    let barrack = Arc::new(Barrack::new(
        registry.clone(),
        archivist.clone(),
        Arc::new(custodian),
    ));
    let keystore = Arc::new(KeyStore::new(registry, None));
    Facility {
        barrack,
        keystore,
        archivist,
    }
}
