//! Key-exchange material for one principal.
//!
//! Holds the identity key, the current signed prekey and a FIFO pool of
//! one-time prekeys. Key bytes are opaque here. Every operation takes the
//! store's single lock, so operations on one principal serialize and a
//! one-time prekey can only ever be popped once.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult, Entity};

/// A prekey with its caller-chosen id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prekey {
    /// Id chosen by the uploading client.
    pub id: u64,
    /// Public key bytes.
    pub key: Bytes,
}

impl Prekey {
    /// Create a prekey.
    pub fn new(id: u64, key: impl Into<Bytes>) -> Self {
        Self {
            id,
            key: key.into(),
        }
    }
}

#[derive(Debug, Default)]
struct KeyMaterial {
    identity: Option<Bytes>,
    signed: Option<Prekey>,
    one_time: VecDeque<Prekey>,
}

/// Per-principal key store.
#[derive(Debug, Default)]
pub struct KeyStore {
    inner: RwLock<KeyMaterial>,
}

impl KeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or overwrite the identity key.
    pub fn set_identity(&self, key: impl Into<Bytes>) {
        self.inner.write().identity = Some(key.into());
    }

    /// The identity key, if one was set.
    pub fn identity(&self) -> CoreResult<Bytes> {
        self.inner
            .read()
            .identity
            .clone()
            .ok_or(CoreError::NotFound(Entity::IdentityKey))
    }

    /// Replace the signed prekey as a unit.
    pub fn set_signed_prekey(&self, id: u64, key: impl Into<Bytes>) {
        self.inner.write().signed = Some(Prekey::new(id, key));
    }

    /// The current signed prekey.
    pub fn signed_prekey(&self) -> CoreResult<Prekey> {
        self.inner
            .read()
            .signed
            .clone()
            .ok_or(CoreError::NotFound(Entity::SignedPrekey))
    }

    /// Append a one-time prekey. Fails if `id` is already in the pool.
    pub fn add_one_time_prekey(&self, id: u64, key: impl Into<Bytes>) -> CoreResult<()> {
        let mut material = self.inner.write();
        if material.one_time.iter().any(|k| k.id == id) {
            return Err(CoreError::AlreadyExists(Entity::OneTimePrekey));
        }
        material.one_time.push_back(Prekey::new(id, key));
        Ok(())
    }

    /// Remove a one-time prekey by id.
    pub fn remove_one_time_prekey(&self, id: u64) -> CoreResult<Prekey> {
        let mut material = self.inner.write();
        let position = material
            .one_time
            .iter()
            .position(|k| k.id == id)
            .ok_or(CoreError::NotFound(Entity::OneTimePrekey))?;
        material
            .one_time
            .remove(position)
            .ok_or(CoreError::NotFound(Entity::OneTimePrekey))
    }

    /// Remove and return the oldest one-time prekey.
    pub fn pop_one_time_prekey(&self) -> CoreResult<Prekey> {
        self.inner
            .write()
            .one_time
            .pop_front()
            .ok_or(CoreError::Empty(Entity::OneTimePrekey))
    }

    /// Ids of the pooled one-time prekeys in insertion order.
    pub fn one_time_prekey_ids(&self) -> Vec<u64> {
        self.inner.read().one_time.iter().map(|k| k.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn identity_absent_until_set() {
        let store = KeyStore::new();
        assert_eq!(
            store.identity(),
            Err(CoreError::NotFound(Entity::IdentityKey))
        );

        store.set_identity(&b"K1"[..]);
        store.set_identity(&b"K2"[..]);
        assert_eq!(store.identity().unwrap(), Bytes::from_static(b"K2"));
    }

    #[test]
    fn signed_prekey_replaced_as_unit() {
        let store = KeyStore::new();
        assert_eq!(
            store.signed_prekey(),
            Err(CoreError::NotFound(Entity::SignedPrekey))
        );

        store.set_signed_prekey(1, &b"S1"[..]);
        store.set_signed_prekey(2, &b"S2"[..]);
        assert_eq!(store.signed_prekey().unwrap(), Prekey::new(2, &b"S2"[..]));
    }

    #[test]
    fn duplicate_one_time_id_rejected() {
        let store = KeyStore::new();
        store.add_one_time_prekey(5, &b"a"[..]).unwrap();
        assert_eq!(
            store.add_one_time_prekey(5, &b"b"[..]),
            Err(CoreError::AlreadyExists(Entity::OneTimePrekey))
        );
        assert_eq!(store.one_time_prekey_ids(), vec![5]);
    }

    #[test]
    fn removed_id_can_be_reused() {
        let store = KeyStore::new();
        store.add_one_time_prekey(5, &b"a"[..]).unwrap();
        assert_eq!(store.remove_one_time_prekey(5).unwrap().key, &b"a"[..]);
        assert_eq!(
            store.remove_one_time_prekey(5),
            Err(CoreError::NotFound(Entity::OneTimePrekey))
        );
        store.add_one_time_prekey(5, &b"b"[..]).unwrap();
    }

    #[test]
    fn pop_is_fifo_and_exactly_once() {
        let store = KeyStore::new();
        for id in [3, 1, 2] {
            store.add_one_time_prekey(id, vec![id as u8]).unwrap();
        }
        assert_eq!(store.one_time_prekey_ids(), vec![3, 1, 2]);

        let popped: Vec<u64> = (0..3)
            .map(|_| store.pop_one_time_prekey().unwrap().id)
            .collect();
        assert_eq!(popped, vec![3, 1, 2]);
        assert_eq!(
            store.pop_one_time_prekey(),
            Err(CoreError::Empty(Entity::OneTimePrekey))
        );
    }

    #[test]
    fn listing_does_not_consume() {
        let store = KeyStore::new();
        store.add_one_time_prekey(1, &b"a"[..]).unwrap();
        store.one_time_prekey_ids();
        store.one_time_prekey_ids();
        assert_eq!(store.pop_one_time_prekey().unwrap().id, 1);
    }

    #[test]
    fn concurrent_pops_never_share_a_key() {
        let store = Arc::new(KeyStore::new());
        for id in 0..500 {
            store.add_one_time_prekey(id, Bytes::new()).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Ok(key) = store.pop_one_time_prekey() {
                        got.push(key.id);
                    }
                    got
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "key {id} popped twice");
            }
        }
        assert_eq!(seen.len(), 500);
    }
}
