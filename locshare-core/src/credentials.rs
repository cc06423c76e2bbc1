//! Password verification with a per-principal failure cool-down.
//!
//! The failure counter and timestamp are updated after the hash comparison,
//! not atomically with it. Concurrent failing attempts may each observe a
//! stale counter, so the limit is best-effort.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::{CoreError, CoreResult};

/// Password hashing primitive used by [`CredentialGuard`].
pub trait CredentialHasher: Send + Sync + fmt::Debug {
    /// Hash a password into a self-describing string.
    fn hash(&self, password: &str) -> CoreResult<String>;

    /// Whether `password` matches `hash`. Unparsable hashes never match.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id hasher producing PHC strings with a random 16-byte salt.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Create a hasher with explicit cost parameters.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> CoreResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| CoreError::InvalidInput(format!("argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> CoreResult<String> {
        let mut salt = [0u8; 16];
        getrandom::getrandom(&mut salt)
            .map_err(|e| CoreError::ResourceExhausted(format!("random source: {e}")))?;
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| CoreError::Internal(format!("salt encoding: {e}")))?;

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CoreError::Internal(format!("password hashing: {e}")))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// When repeated failures lock a principal out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    /// How long after the last failure the lockout applies.
    pub window: Duration,
    /// Failures tolerated before the lockout kicks in.
    pub max_failures: u32,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_failures: 3,
        }
    }
}

#[derive(Debug, Default)]
struct Failures {
    count: u32,
    last: Option<Instant>,
}

/// Stored password hash plus the failure state guarding it.
pub struct CredentialGuard {
    hash: RwLock<String>,
    failures: Mutex<Failures>,
    policy: LoginPolicy,
    hasher: Arc<dyn CredentialHasher>,
}

impl fmt::Debug for CredentialGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGuard")
            .field("policy", &self.policy)
            .field("failures", &self.failures.lock().count)
            .finish_non_exhaustive()
    }
}

impl CredentialGuard {
    /// Wrap an already computed hash.
    pub fn new(hash: String, hasher: Arc<dyn CredentialHasher>, policy: LoginPolicy) -> Self {
        Self {
            hash: RwLock::new(hash),
            failures: Mutex::new(Failures::default()),
            policy,
            hasher,
        }
    }

    /// Hash `password` and wrap the result.
    pub fn with_password(
        password: &str,
        hasher: Arc<dyn CredentialHasher>,
        policy: LoginPolicy,
    ) -> CoreResult<Self> {
        let hash = hasher.hash(password)?;
        Ok(Self::new(hash, hasher, policy))
    }

    /// Check a password.
    ///
    /// While locked out this fails with [`CoreError::RateLimited`] without
    /// consulting the stored hash.
    pub fn authenticate(&self, password: &str) -> CoreResult<()> {
        if self.is_locked_out() {
            return Err(CoreError::RateLimited);
        }

        let hash = self.hash.read().clone();
        if self.hasher.verify(password, &hash) {
            self.failures.lock().count = 0;
            return Ok(());
        }

        let mut failures = self.failures.lock();
        failures.count = failures.count.saturating_add(1);
        failures.last = Some(Instant::now());
        warn!(failures = failures.count, "authentication failed");
        Err(CoreError::PermissionDenied("authentication failed".into()))
    }

    /// Replace the stored hash.
    pub fn set_password(&self, password: &str) -> CoreResult<()> {
        if password.is_empty() {
            return Err(CoreError::InvalidInput("password must not be empty".into()));
        }
        let hash = self.hasher.hash(password)?;
        *self.hash.write() = hash;
        Ok(())
    }

    fn is_locked_out(&self) -> bool {
        let failures = self.failures.lock();
        match failures.last {
            Some(last) => {
                last.elapsed() < self.policy.window && failures.count > self.policy.max_failures
            }
            None => false,
        }
    }
}
