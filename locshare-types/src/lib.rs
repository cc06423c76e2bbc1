//! # locshare-types
//!
//! Wire format types for the locshare location relay.
//!
//! - [`Location`] - The fixed 56-byte location record senders encrypt
//! - [`AuthRequest`], [`KeyResponse`], [`DeliveredMessage`], ... - JSON bodies of the HTTP API
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod location;
mod messages;

pub use error::WireError;
pub use location::{Location, LOCATION_LEN};
pub use messages::{
    base64_bytes, AuthRequest, CreatePrincipalRequest, DeliveredMessage, ErrorResponse,
    KeyResponse, OneTimeKeysResponse, PasswordChangeRequest,
};
