//! A named account and the per-principal state it owns.

use std::sync::Arc;

use crate::credentials::{Argon2Hasher, CredentialGuard, CredentialHasher, LoginPolicy};
use crate::keys::KeyStore;
use crate::mailbox::{Mailbox, DEFAULT_BUFFER_LIMIT};

/// Settings applied to every principal a registry creates.
#[derive(Debug, Clone)]
pub struct PrincipalSettings {
    /// Password hashing primitive.
    pub hasher: Arc<dyn CredentialHasher>,
    /// Login failure cool-down.
    pub login_policy: LoginPolicy,
    /// Mailbox buffer capacity.
    pub buffer_limit: usize,
}

impl Default for PrincipalSettings {
    fn default() -> Self {
        Self {
            hasher: Arc::new(Argon2Hasher::default()),
            login_policy: LoginPolicy::default(),
            buffer_limit: DEFAULT_BUFFER_LIMIT,
        }
    }
}

/// A registered principal.
///
/// Each aspect (credentials, keys, mailbox) is locked independently.
#[derive(Debug)]
pub struct Principal {
    name: String,
    credentials: CredentialGuard,
    keys: KeyStore,
    mailbox: Mailbox,
}

impl Principal {
    pub(crate) fn new(name: String, password_hash: String, settings: &PrincipalSettings) -> Self {
        Self {
            name,
            credentials: CredentialGuard::new(
                password_hash,
                Arc::clone(&settings.hasher),
                settings.login_policy,
            ),
            keys: KeyStore::new(),
            mailbox: Mailbox::new(settings.buffer_limit),
        }
    }

    /// The principal's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Password hash and login cool-down.
    pub fn credentials(&self) -> &CredentialGuard {
        &self.credentials
    }

    /// Key-exchange material.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Incoming message mailbox.
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}
