//! Per-conversation symmetric key cache.
//!
//! Keys are indexed by `(sender, receiver)`. The receiver of an A→B message
//! caches the key it unwrapped under the same pair, so both ends converge on
//! one key per direction. Broadcast receivers always get the plaintext
//! pass-through key and are never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use dim_crypto::aes::AES;
use dim_crypto::coder::Dict;
use dim_crypto::keys::symmetric_keys_equal;
use dim_crypto::plain::PlainKey;
use dim_crypto::{CryptoRegistry, SymmetricKey};
use dim_mkm::ID;

use crate::delegate::{CipherKeyDelegate, KeyRepository};

struct Table {
    map: HashMap<ID, HashMap<ID, Arc<dyn SymmetricKey>>>,
    dirty: bool,
}

pub struct KeyStore {
    registry: Arc<CryptoRegistry>,
    repository: Option<Arc<dyn KeyRepository>>,
    table: Mutex<Table>,
}

impl KeyStore {
    pub fn new(registry: Arc<CryptoRegistry>, repository: Option<Arc<dyn KeyRepository>>) -> Self {
        Self {
            registry,
            repository,
            table: Mutex::new(Table {
                map: HashMap::new(),
                dirty: false,
            }),
        }
    }

    /// Key for `sender` → `receiver`, generating and caching a fresh AES key
    /// when asked to.
    pub fn get(&self, sender: &ID, receiver: &ID, generate: bool) -> Option<Arc<dyn SymmetricKey>> {
        if receiver.is_broadcast() {
            return Some(PlainKey::shared());
        }
        let mut table = self.lock();
        if let Some(key) = table
            .map
            .get(sender)
            .and_then(|inner| inner.get(receiver))
        {
            return Some(key.clone());
        }
        if !generate {
            return None;
        }
        let key = self.registry.symmetric_generate(AES)?;
        debug!(%sender, %receiver, "generated fresh conversation key");
        table
            .map
            .entry(sender.clone())
            .or_default()
            .insert(receiver.clone(), key.clone());
        table.dirty = true;
        Some(key)
    }

    /// Cache a key; a structurally identical key already in place is a
    /// no-op and does not mark the store dirty.
    pub fn put(&self, sender: &ID, receiver: &ID, key: Arc<dyn SymmetricKey>) {
        if receiver.is_broadcast() {
            return;
        }
        let mut table = self.lock();
        let inner = table.map.entry(sender.clone()).or_default();
        if let Some(existing) = inner.get(receiver) {
            if symmetric_keys_equal(existing.as_ref(), key.as_ref()) {
                return;
            }
        }
        inner.insert(receiver.clone(), key);
        table.dirty = true;
    }

    /// Persist the whole map when dirty; clears the flag on success.
    pub fn flush(&self) -> bool {
        let repository = match &self.repository {
            Some(repository) => repository.clone(),
            None => return false,
        };
        let key_map = {
            let table = self.lock();
            if !table.dirty {
                return true;
            }
            serialize_table(&table.map)
        };
        if repository.save_keys(&key_map) {
            self.lock().dirty = false;
            true
        } else {
            warn!("key store flush failed");
            false
        }
    }

    /// Replace the map from persistent storage.
    pub fn reload(&self) -> bool {
        let repository = match &self.repository {
            Some(repository) => repository.clone(),
            None => return false,
        };
        let key_map = match repository.load_keys() {
            Some(key_map) => key_map,
            None => return false,
        };
        let map = self.deserialize_table(&key_map);
        let mut table = self.lock();
        table.map = map;
        table.dirty = false;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn deserialize_table(&self, key_map: &Dict) -> HashMap<ID, HashMap<ID, Arc<dyn SymmetricKey>>> {
        let mut map: HashMap<ID, HashMap<ID, Arc<dyn SymmetricKey>>> = HashMap::new();
        for (sender, receivers) in key_map {
            let sender = match ID::parse(sender) {
                Ok(sender) => sender,
                Err(_) => continue,
            };
            let receivers = match receivers.as_object() {
                Some(receivers) => receivers,
                None => continue,
            };
            let inner = map.entry(sender).or_default();
            for (receiver, key) in receivers {
                let receiver = match ID::parse(receiver) {
                    Ok(receiver) => receiver,
                    Err(_) => continue,
                };
                let key = match key.as_object().and_then(|k| self.registry.symmetric_parse(k)) {
                    Some(key) => key,
                    None => {
                        warn!(%receiver, "dropping unparseable cached key");
                        continue;
                    }
                };
                inner.insert(receiver, key);
            }
        }
        map
    }
}

fn serialize_table(map: &HashMap<ID, HashMap<ID, Arc<dyn SymmetricKey>>>) -> Dict {
    let mut key_map = Dict::new();
    for (sender, receivers) in map {
        let mut inner = Dict::new();
        for (receiver, key) in receivers {
            inner.insert(receiver.to_string(), Value::Object(key.to_dict()));
        }
        key_map.insert(sender.to_string(), Value::Object(inner));
    }
    key_map
}

impl CipherKeyDelegate for KeyStore {
    fn cipher_key(
        &self,
        sender: &ID,
        receiver: &ID,
        generate: bool,
    ) -> Option<Arc<dyn SymmetricKey>> {
        self.get(sender, receiver, generate)
    }

    fn cache_cipher_key(&self, sender: &ID, receiver: &ID, key: Arc<dyn SymmetricKey>) {
        self.put(sender, receiver, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dim_crypto::plain::PLAIN;
    use dim_mkm::Address;

    fn user(name: &str) -> ID {
        ID::new(Some(name), Address::btc_from_data(name.as_bytes(), 0x08), None)
    }

    fn store() -> KeyStore {
        KeyStore::new(Arc::new(CryptoRegistry::default()), None)
    }

    struct MemoryRepository {
        saved: Mutex<Option<Dict>>,
    }

    impl KeyRepository for MemoryRepository {
        fn save_keys(&self, key_map: &Dict) -> bool {
            *self.saved.lock().unwrap() = Some(key_map.clone());
            true
        }

        fn load_keys(&self) -> Option<Dict> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_generate_and_cache() {
        let store = store();
        let (moki, hulk) = (user("moki"), user("hulk"));

        assert!(store.get(&moki, &hulk, false).is_none());
        let key = store.get(&moki, &hulk, true).unwrap();
        assert_eq!(key.algorithm(), AES);

        let again = store.get(&moki, &hulk, false).unwrap();
        assert!(symmetric_keys_equal(key.as_ref(), again.as_ref()));
    }

    #[test]
    fn test_broadcast_is_plain_and_uncached() {
        let store = store();
        let moki = user("moki");

        let key = store.get(&moki, &ID::everyone(), false).unwrap();
        assert_eq!(key.algorithm(), PLAIN);

        store.put(&moki, &ID::everyone(), key);
        assert!(!store.lock().dirty);
    }

    #[test]
    fn test_idempotent_put() {
        let store = store();
        let (moki, hulk) = (user("moki"), user("hulk"));
        let key = store.get(&moki, &hulk, true).unwrap();

        store.lock().dirty = false;
        store.put(&moki, &hulk, key.clone());
        assert!(!store.lock().dirty);

        // a different key does dirty the store
        let other = CryptoRegistry::default().symmetric_generate(AES).unwrap();
        store.put(&moki, &hulk, other);
        assert!(store.lock().dirty);
    }

    #[test]
    fn test_flush_and_reload() {
        let repository = Arc::new(MemoryRepository {
            saved: Mutex::new(None),
        });
        let store = KeyStore::new(
            Arc::new(CryptoRegistry::default()),
            Some(repository.clone()),
        );
        let (moki, hulk) = (user("moki"), user("hulk"));
        let key = store.get(&moki, &hulk, true).unwrap();

        assert!(store.flush());
        assert!(!store.lock().dirty);
        assert!(repository.saved.lock().unwrap().is_some());

        // a second store picks the key back up
        let other = KeyStore::new(Arc::new(CryptoRegistry::default()), Some(repository));
        assert!(other.reload());
        let restored = other.get(&moki, &hulk, false).unwrap();
        assert!(symmetric_keys_equal(key.as_ref(), restored.as_ref()));
    }
}
