//! Error types for locshare wire formats.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A fixed-size record had the wrong length
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    BufferTooShort {
        /// Length the record format requires
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::BufferTooShort {
            expected: 56,
            actual: 12,
        };
        assert_eq!(err.to_string(), "buffer too short: expected 56 bytes, got 12");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
