//! Entity views: users and groups.
//!
//! Entities are thin handles holding only their identifier; every attribute
//! is resolved through the [`Barrack`](crate::Barrack) on demand, so there
//! are no object cycles between entities.

use std::sync::Arc;

use dim_crypto::{PrivateKey, PublicKey};
use dim_mkm::{document, Document, Meta, ID};

use crate::barrack::Barrack;

#[derive(Clone)]
pub enum Entity {
    User(User),
    Group(Group),
}

impl Entity {
    pub fn identifier(&self) -> &ID {
        match self {
            Self::User(user) => &user.id,
            Self::Group(group) => &group.id,
        }
    }
}

/// A user (or station/bot, which share the user shape).
#[derive(Clone)]
pub struct User {
    pub(crate) id: ID,
}

impl User {
    pub fn new(id: ID) -> Self {
        Self { id }
    }

    pub fn identifier(&self) -> &ID {
        &self.id
    }

    pub fn meta(&self, barrack: &Barrack) -> Option<Meta> {
        barrack.meta(&self.id)
    }

    /// Newest visa document, verified at save time.
    pub fn visa(&self, barrack: &Barrack) -> Option<Document> {
        barrack.document(&self.id, Some(document::VISA))
    }

    /// Wrap data for this user with their published encryption key.
    pub fn encrypt(&self, barrack: &Barrack, plaintext: &[u8]) -> Option<Vec<u8>> {
        barrack
            .public_key_for_encryption(&self.id)?
            .encrypt(plaintext)
    }

    /// Check a signature against all known verification keys, visa first.
    pub fn verify(&self, barrack: &Barrack, data: &[u8], signature: &[u8]) -> bool {
        barrack
            .public_keys_for_verification(&self.id)
            .iter()
            .any(|key| key.verify(data, signature))
    }

    /// Sign with the local custodian's key; `None` for remote users.
    pub fn sign_key(&self, barrack: &Barrack) -> Option<Arc<dyn PrivateKey>> {
        barrack.private_key_for_signature(&self.id)
    }
}

#[derive(Clone)]
pub struct Group {
    pub(crate) id: ID,
}

impl Group {
    pub fn new(id: ID) -> Self {
        Self { id }
    }

    pub fn identifier(&self) -> &ID {
        &self.id
    }

    pub fn meta(&self, barrack: &Barrack) -> Option<Meta> {
        barrack.meta(&self.id)
    }

    pub fn bulletin(&self, barrack: &Barrack) -> Option<Document> {
        barrack.document(&self.id, Some(document::BULLETIN))
    }

    pub fn members(&self, barrack: &Barrack) -> Vec<ID> {
        barrack.members(&self.id)
    }

    pub fn owner(&self, barrack: &Barrack) -> Option<ID> {
        barrack.owner(&self.id)
    }

    pub fn administrators(&self, barrack: &Barrack) -> Vec<ID> {
        barrack.administrators(&self.id)
    }

    /// Bots that relay history for this group.
    pub fn assistants(&self, barrack: &Barrack) -> Vec<ID> {
        self.bulletin(barrack)
            .map(|bulletin| bulletin.assistants())
            .unwrap_or_default()
    }
}

/// Verification keys for an identifier, visa-derived first.
pub(crate) fn dedup_keys(keys: Vec<Arc<dyn PublicKey>>) -> Vec<Arc<dyn PublicKey>> {
    let mut seen: Vec<dim_crypto::Dict> = Vec::new();
    let mut out = Vec::new();
    for key in keys {
        let dict = key.to_dict();
        if !seen.contains(&dict) {
            seen.push(dict);
            out.push(key);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::delegate::Archivist;
    use crate::testutil::{facility, rsa_user};
    use dim_mkm::{network, Address};

    #[test]
    fn test_user_sign_and_verify_through_barrack() {
        let moki = rsa_user("moki");
        let moki_id = moki.0.clone();
        let side = facility(vec![moki], vec![]);
        let barrack = side.barrack;

        let user = barrack.user(&moki_id);
        assert!(user.meta(&barrack).is_some());

        let signature = user.sign_key(&barrack).unwrap().sign(b"moky").unwrap();
        assert!(user.verify(&barrack, b"moky", &signature));
        assert!(!user.verify(&barrack, b"mokey", &signature));
    }

    #[test]
    fn test_user_encrypt_uses_published_key() {
        let moki = rsa_user("moki");
        let hulk = rsa_user("hulk");
        let hulk_id = hulk.0.clone();
        let hulk_sk = hulk.1.clone();
        let side = facility(vec![moki], vec![(hulk_id.clone(), hulk.2)]);

        let user = side.barrack.user(&hulk_id);
        let wrapped = user.encrypt(&side.barrack, b"moky").unwrap();
        assert_eq!(hulk_sk.decrypt(&wrapped).unwrap(), b"moky".to_vec());
    }

    #[test]
    fn test_group_members_and_owner() {
        let moki = rsa_user("moki");
        let hulk = rsa_user("hulk");
        let (moki_id, hulk_id) = (moki.0.clone(), hulk.0.clone());
        let group_id = ID::new(
            Some("club"),
            Address::btc_from_data(b"club", network::GROUP),
            None,
        );

        let side = facility(vec![moki], vec![(hulk_id.clone(), hulk.2)]);
        side.archivist
            .save_members(&group_id, &[moki_id.clone(), hulk_id.clone()]);

        let group = side.barrack.group(&group_id);
        assert_eq!(group.members(&side.barrack).len(), 2);
        // no bulletin: the first member is the owner
        assert_eq!(group.owner(&side.barrack), Some(moki_id));
        assert!(group.bulletin(&side.barrack).is_none());
        assert!(group.assistants(&side.barrack).is_empty());
    }

    #[test]
    fn test_dedup_keys_by_dictionary() {
        let moki = rsa_user("moki");
        let key = moki.1.public_key();
        let other = rsa_user("hulk").1.public_key();
        let deduped = dedup_keys(vec![key.clone(), key, other]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_entity_kind_follows_address() {
        let moki = rsa_user("moki");
        let moki_id = moki.0.clone();
        let side = facility(vec![moki], vec![]);
        assert!(matches!(side.barrack.entity(&moki_id), Entity::User(_)));
        assert!(matches!(
            side.barrack.entity(&ID::everyone()),
            Entity::Group(_)
        ));
    }
}
