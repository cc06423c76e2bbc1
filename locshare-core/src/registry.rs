//! The set of registered principals.
//!
//! The name index is guarded separately from each principal's own state, so
//! adding or removing one principal never blocks work on another.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::error::{CoreError, CoreResult, Entity};
use crate::principal::{Principal, PrincipalSettings};

/// Owns every principal for the lifetime of the process.
#[derive(Debug, Default)]
pub struct Registry {
    principals: DashMap<String, Arc<Principal>>,
    settings: PrincipalSettings,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(settings: PrincipalSettings) -> Self {
        Self {
            principals: DashMap::new(),
            settings,
        }
    }

    /// Register a principal.
    ///
    /// The password is hashed before the index is touched.
    pub fn register(&self, name: &str, password: &str) -> CoreResult<Arc<Principal>> {
        if name.is_empty() {
            return Err(CoreError::InvalidInput("username must not be empty".into()));
        }
        if password.is_empty() {
            return Err(CoreError::InvalidInput("password must not be empty".into()));
        }
        if self.principals.contains_key(name) {
            return Err(CoreError::AlreadyExists(Entity::Principal));
        }

        let hash = self.settings.hasher.hash(password)?;

        match self.principals.entry(name.to_string()) {
            Entry::Occupied(_) => Err(CoreError::AlreadyExists(Entity::Principal)),
            Entry::Vacant(slot) => {
                let principal = Arc::new(Principal::new(name.to_string(), hash, &self.settings));
                slot.insert(Arc::clone(&principal));
                info!(principal = name, "principal registered");
                Ok(principal)
            }
        }
    }

    /// Look up a principal.
    pub fn get(&self, name: &str) -> CoreResult<Arc<Principal>> {
        self.principals
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(CoreError::NotFound(Entity::Principal))
    }

    /// Check a principal's password.
    pub fn authenticate(&self, name: &str, password: &str) -> CoreResult<Arc<Principal>> {
        let principal = self.get(name)?;
        principal.credentials().authenticate(password)?;
        Ok(principal)
    }

    /// Remove a principal and tear its mailbox down.
    ///
    /// Sessions bound to the principal are the caller's to invalidate.
    pub async fn remove(&self, name: &str) -> CoreResult<Arc<Principal>> {
        let (_, principal) = self
            .principals
            .remove(name)
            .ok_or(CoreError::NotFound(Entity::Principal))?;
        principal.mailbox().close_all().await;
        info!(principal = name, "principal removed");
        Ok(principal)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.principals.contains_key(name)
    }

    /// Number of registered principals.
    pub fn len(&self) -> usize {
        self.principals.len()
    }

    /// Whether no principal is registered.
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::PlainHasher;
    use crate::credentials::LoginPolicy;
    use crate::mailbox::{Delivery, Message, DEFAULT_BUFFER_LIMIT};
    use crate::session::SessionStore;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::time::timeout;

    fn registry() -> Registry {
        Registry::new(PrincipalSettings {
            hasher: Arc::new(PlainHasher::default()),
            login_policy: LoginPolicy::default(),
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        })
    }

    #[test]
    fn register_rejects_empty_and_duplicates() {
        let registry = registry();
        assert!(matches!(
            registry.register("", "pw"),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.register("bob", ""),
            Err(CoreError::InvalidInput(_))
        ));

        registry.register("bob", "pw").unwrap();
        assert_eq!(
            registry.register("bob", "other").unwrap_err(),
            CoreError::AlreadyExists(Entity::Principal)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn authenticate_through_registry() {
        let registry = registry();
        registry.register("bob", "pw").unwrap();

        assert_eq!(registry.authenticate("bob", "pw").unwrap().name(), "bob");
        assert!(matches!(
            registry.authenticate("bob", "nope"),
            Err(CoreError::PermissionDenied(_))
        ));
        assert_eq!(
            registry.authenticate("carol", "pw").unwrap_err(),
            CoreError::NotFound(Entity::Principal)
        );
    }

    #[tokio::test]
    async fn remove_tears_down_mailbox() {
        let registry = registry();
        let bob = registry.register("bob", "pw").unwrap();
        let mut sub = bob.mailbox().subscribe().await;

        registry.remove("bob").await.unwrap();

        assert!(!registry.contains("bob"));
        assert!(sub.recv().await.is_none());
        assert_eq!(
            registry.remove("bob").await.unwrap_err(),
            CoreError::NotFound(Entity::Principal)
        );
        // The name is free again.
        registry.register("bob", "pw").unwrap();
    }

    #[tokio::test]
    async fn key_exchange_and_delivery_scenario() {
        let registry = registry();
        let sessions = SessionStore::default();

        let bob = registry.register("bob", "bob-pw").unwrap();
        bob.keys().set_identity(Bytes::from_static(b"K"));
        bob.keys()
            .add_one_time_prekey(1, Bytes::from_static(b"B"))
            .unwrap();

        registry.register("alice", "alice-pw").unwrap();
        registry.authenticate("alice", "alice-pw").unwrap();
        let alice = sessions.create(["interactive", "publish"]).unwrap();
        alice.bind_username("alice").unwrap();
        alice.require_capability("interactive").unwrap();

        let target = registry.get("bob").unwrap();
        assert_eq!(target.keys().identity().unwrap(), Bytes::from_static(b"K"));
        let otk = target.keys().pop_one_time_prekey().unwrap();
        assert_eq!((otk.id, otk.key), (1, Bytes::from_static(b"B")));
        assert_eq!(
            target.keys().pop_one_time_prekey().unwrap_err(),
            CoreError::Empty(Entity::OneTimePrekey)
        );

        alice.require_capability("publish").unwrap();
        let source = alice.username().unwrap();
        assert_eq!(
            target.mailbox().publish(Message::new(source, &b"C"[..])).await,
            Delivery::Buffered
        );

        let mut inbox = bob.mailbox().subscribe().await;
        assert_eq!(inbox.try_recv(), Some(Message::new("alice", &b"C"[..])));
        assert!(inbox.try_recv().is_none());

        let publish = target.mailbox().publish(Message::new(source, &b"C2"[..]));
        let (delivery, received) = tokio::join!(publish, async {
            timeout(Duration::from_secs(2), inbox.recv()).await
        });
        assert_eq!(delivery, Delivery::FannedOut(1));
        assert_eq!(received.unwrap(), Some(Message::new("alice", &b"C2"[..])));
        assert!(bob.mailbox().buffered().await.is_empty());
    }
}
