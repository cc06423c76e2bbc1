//! Bearer-token sessions and capability checks.
//!
//! Capabilities are free-form strings chosen by the client at login. The store
//! does not check them against any catalogue: authorization only asks whether
//! the session's own set contains a name.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult, Entity};

/// Default number of token draws before session creation gives up.
pub const DEFAULT_TOKEN_ATTEMPTS: u32 = 10;

/// Random bytes per session token.
pub const TOKEN_BYTES: usize = 64;

/// Source of candidate session tokens.
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Draw a fresh token, or `None` if the random source failed.
    fn token(&self) -> Option<String>;
}

/// Tokens from the OS random source, base64url encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn token(&self) -> Option<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        getrandom::getrandom(&mut bytes).ok()?;
        Some(URL_SAFE.encode(bytes))
    }
}

/// An authenticated (or authenticating) client session.
pub struct Session {
    token: String,
    capabilities: HashSet<String>,
    username: OnceLock<String>,
    valid: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token deliberately omitted.
        f.debug_struct("Session")
            .field("capabilities", &self.capabilities)
            .field("username", &self.username.get())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Session {
    fn new(token: String, capabilities: HashSet<String>) -> Self {
        Self {
            token,
            capabilities,
            username: OnceLock::new(),
            valid: AtomicBool::new(true),
        }
    }

    /// The bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The capability set fixed at creation.
    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    /// Fail unless the session is valid and carries `capability`.
    pub fn require_capability(&self, capability: &str) -> CoreResult<()> {
        if !self.is_valid() {
            return Err(CoreError::PermissionDenied("session is no longer valid".into()));
        }
        if !self.capabilities.contains(capability) {
            return Err(CoreError::PermissionDenied(format!(
                "no such capability: {capability}"
            )));
        }
        Ok(())
    }

    /// Bind the authenticated principal. Succeeds at most once.
    pub fn bind_username(&self, username: impl Into<String>) -> CoreResult<()> {
        self.username
            .set(username.into())
            .map_err(|_| CoreError::InvalidInput("session already has a username".into()))
    }

    /// The bound principal, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// Mark the session invalid. There is no way back.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    /// Whether the session is still valid.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

/// Index of live sessions by token.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    source: Arc<dyn TokenSource>,
    attempts: u32,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("attempts", &self.attempts)
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Arc::new(OsTokenSource), DEFAULT_TOKEN_ATTEMPTS)
    }
}

impl SessionStore {
    /// Create a store drawing tokens from `source`, up to `attempts` per session.
    pub fn new(source: Arc<dyn TokenSource>, attempts: u32) -> Self {
        Self {
            sessions: DashMap::new(),
            source,
            attempts,
        }
    }

    /// Issue a new valid session with no username.
    pub fn create<I, S>(&self, capabilities: I) -> CoreResult<Arc<Session>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capabilities: HashSet<String> = capabilities.into_iter().map(Into::into).collect();

        for attempt in 1..=self.attempts {
            let Some(token) = self.source.token() else {
                debug!(attempt, "token source failed");
                continue;
            };
            match self.sessions.entry(token) {
                Entry::Occupied(_) => debug!(attempt, "session token collision"),
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session::new(slot.key().clone(), capabilities));
                    slot.insert(Arc::clone(&session));
                    return Ok(session);
                }
            }
        }

        Err(CoreError::ResourceExhausted("could not allocate session".into()))
    }

    /// Find a session by token. Validity is not checked.
    pub fn lookup(&self, token: &str) -> CoreResult<Arc<Session>> {
        self.sessions
            .get(token)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(CoreError::NotFound(Entity::Session))
    }

    /// Invalidate a session and drop it from the index.
    pub fn delete(&self, token: &str) -> CoreResult<()> {
        let (_, session) = self
            .sessions
            .remove(token)
            .ok_or(CoreError::NotFound(Entity::Session))?;
        session.invalidate();
        Ok(())
    }

    /// Invalidate and drop every session bound to `username`.
    pub fn invalidate_principal(&self, username: &str) -> usize {
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            if session.username() == Some(username) {
                session.invalidate();
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            info!(username, removed, "invalidated sessions");
        }
        removed
    }

    /// Number of indexed sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is indexed.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
