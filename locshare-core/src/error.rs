//! Error taxonomy shared by every core component.

use std::fmt;

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The kind of thing an operation could not find, or found twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A registered principal
    Principal,
    /// A session token
    Session,
    /// A principal's identity key
    IdentityKey,
    /// A principal's signed prekey
    SignedPrekey,
    /// A one-time prekey
    OneTimePrekey,
    /// A mailbox subscription
    Subscription,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Principal => "principal",
            Entity::Session => "session",
            Entity::IdentityKey => "identity key",
            Entity::SignedPrekey => "signed prekey",
            Entity::OneTimePrekey => "one-time prekey",
            Entity::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the mailbox, key store, session store and registry.
///
/// Messages never carry secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The named entity does not exist
    #[error("no such {0}")]
    NotFound(Entity),

    /// A collection of the named entity is empty
    #[error("no {0}s available")]
    Empty(Entity),

    /// The named entity already exists
    #[error("{0} already exists")]
    AlreadyExists(Entity),

    /// Bad credentials, missing capability or invalid session
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Authentication cool-down is active
    #[error("rate limited")]
    RateLimited,

    /// A bounded allocation ran out of attempts
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Malformed request or empty required field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unexpected failure in a collaborator
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error means "nothing there" at the boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_) | CoreError::Empty(_))
    }
}
