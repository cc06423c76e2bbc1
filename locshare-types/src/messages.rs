//! JSON bodies exchanged with the relay's HTTP and WebSocket endpoints.
//!
//! Byte fields (keys, ciphertext) travel as standard base64 strings.

use serde::{Deserialize, Serialize};

/// Request body for creating a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Principal name
    #[serde(default)]
    pub username: String,
    /// Plaintext password
    #[serde(default)]
    pub password: String,
    /// Capabilities the session should carry
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Request body for registering a principal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreatePrincipalRequest {
    /// Principal name
    #[serde(default)]
    pub username: String,
    /// Plaintext password
    #[serde(default)]
    pub password: String,
}

/// Request body for changing a password.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    /// Current password
    #[serde(default)]
    pub old_password: String,
    /// Replacement password
    #[serde(default)]
    pub new_password: String,
}

/// A prekey as returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResponse {
    /// Caller-chosen key id
    #[serde(rename = "keyID")]
    pub key_id: u64,
    /// Public key bytes
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

/// Ids of the one-time prekeys a principal has uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OneTimeKeysResponse {
    /// Ids in insertion order
    pub keys: Vec<u64>,
}

/// A message delivered on a subscription stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    /// Sending principal
    pub source: String,
    /// Ciphertext, opaque to the relay
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

/// Body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `"error"`
    pub status: String,
    /// Human-readable reason
    pub error: String,
}

impl ErrorResponse {
    /// Build an error body from a message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: error.into(),
        }
    }
}

/// Serde adapter for byte fields carried as standard base64.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64 string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize bytes from a base64 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_missing_fields_default_to_empty() {
        let req: AuthRequest = serde_json::from_str(r#"{"username":"alice"}"#).unwrap();
        assert_eq!(req.username, "alice");
        assert!(req.password.is_empty());
        assert!(req.capabilities.is_empty());
    }

    #[test]
    fn password_change_uses_camel_case() {
        let req: PasswordChangeRequest =
            serde_json::from_str(r#"{"oldPassword":"a","newPassword":"b"}"#).unwrap();
        assert_eq!(req.old_password, "a");
        assert_eq!(req.new_password, "b");
    }

    #[test]
    fn key_response_field_names() {
        let resp = KeyResponse {
            key_id: 7,
            key: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["keyID"], 7);
        assert_eq!(json["key"], "AQID");
    }

    #[test]
    fn delivered_message_content_is_base64() {
        let json = r#"{"source":"alice","content":"aGVsbG8="}"#;
        let msg: DeliveredMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.source, "alice");
        assert_eq!(msg.content, b"hello");

        let bad = r#"{"source":"alice","content":"***"}"#;
        assert!(serde_json::from_str::<DeliveredMessage>(bad).is_err());
    }

    #[test]
    fn error_response_shape() {
        let json = serde_json::to_string(&ErrorResponse::new("no such user")).unwrap();
        assert_eq!(json, r#"{"status":"error","error":"no such user"}"#);
    }
}
