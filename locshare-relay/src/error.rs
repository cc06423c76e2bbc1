//! Error types for locshare-relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use locshare_core::CoreError;
use locshare_types::ErrorResponse;

/// Main error type for relay startup and runtime.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Core component could not be set up.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Line protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Legacy line protocol errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A command had the wrong number of arguments.
    #[error("malformed command {command:?}: expected {expected} arguments, got {actual}")]
    Arity {
        /// The command verb.
        command: String,
        /// Arguments the verb takes.
        expected: usize,
        /// Arguments supplied.
        actual: usize,
    },

    /// A line exceeded the maximum length.
    #[error("line too long (limit: {limit} bytes)")]
    LineTooLong {
        /// The maximum line length.
        limit: usize,
    },
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// An HTTP-facing failure: a status code plus a message safe to show clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Build an error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The status this error maps to.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::NotFound(_) | CoreError::Empty(_) => StatusCode::NOT_FOUND,
            CoreError::AlreadyExists(_) | CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::PermissionDenied(_) | CoreError::RateLimited => StatusCode::UNAUTHORIZED,
            CoreError::ResourceExhausted(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}
