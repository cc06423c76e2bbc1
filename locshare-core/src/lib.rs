//! # locshare-core
//!
//! The in-memory heart of the locshare relay (no sockets, no HTTP).
//!
//! ## Components
//!
//! ```text
//! ┌──────────────────────── Registry ────────────────────────┐
//! │  name → Principal                                        │
//! │          ├── CredentialGuard  (hash + failure cool-down) │
//! │          ├── KeyStore         (identity / signed / OTKs) │
//! │          └── Mailbox          (buffer ⇄ fan-out)         │
//! └──────────────────────────────────────────────────────────┘
//!   SessionStore  token → Session { capabilities, username, valid }
//! ```
//!
//! Transports authenticate through the [`SessionStore`] and [`Registry`],
//! then route to the addressed principal's [`KeyStore`] or [`Mailbox`].
//! Every component locks its own state; there is no global lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credentials;
pub mod error;
pub mod keys;
pub mod mailbox;
pub mod principal;
pub mod registry;
pub mod session;

pub use credentials::{Argon2Hasher, CredentialGuard, CredentialHasher, LoginPolicy};
pub use error::{CoreError, CoreResult, Entity};
pub use keys::{KeyStore, Prekey};
pub use mailbox::{Delivery, Mailbox, Message, Subscription, DEFAULT_BUFFER_LIMIT};
pub use principal::{Principal, PrincipalSettings};
pub use registry::Registry;
pub use session::{OsTokenSource, Session, SessionStore, TokenSource, DEFAULT_TOKEN_ATTEMPTS};
