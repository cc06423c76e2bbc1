//! # locshare-relay
//!
//! Store-and-forward relay for end-to-end encrypted location messages.
//!
//! The relay:
//! - Registers principals and issues capability-scoped session tokens
//! - Stores the public key material clients use to establish sessions
//! - Buffers the latest ciphertext per sender until the recipient subscribes
//! - Streams deliveries to subscribers over WebSocket
//! - Never sees plaintext
//!
//! ## Architecture
//!
//! ```text
//!  Alice ──PUT /user/bob/message──┐
//!                                 ▼
//!        ┌──────────────────────────────────────┐
//!        │            locshare-relay            │
//!        │  Registry ─► Principal ─► Mailbox    │
//!        │  SessionStore   KeyStore             │
//!        │  AdmissionLimiter (accept pacing)    │
//!        └──────────────────────────────────────┘
//!                                 │
//!  Bob ◄──── GET /ws/subscribe ───┘
//! ```
//!
//! An optional line-oriented TCP transport (`legacy`) shares the same
//! mailbox semantics keyed by topic instead of principal.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod legacy;
pub mod limits;
pub mod server;
