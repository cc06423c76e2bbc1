//! Configuration loading for locshare-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use locshare_core::{Argon2Hasher, CoreResult, LoginPolicy};

/// Root configuration for locshare-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerConfig,
    /// Authentication and session configuration.
    pub auth: AuthConfig,
    /// Mailbox configuration.
    pub mailbox: MailboxConfig,
    /// Connection admission configuration.
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP + WebSocket server (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Bind address for the legacy line transport (disabled when absent).
    pub legacy_bind_address: Option<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// How long a lockout lasts after the last failed login (default: 60).
    #[serde(default = "default_login_retry_window_secs")]
    pub login_retry_window_secs: u64,
    /// Failed logins tolerated before lockout (default: 3).
    #[serde(default = "default_login_retry_count")]
    pub login_retry_count: u32,
    /// Token draws per session before giving up (default: 10).
    #[serde(default = "default_session_token_attempts")]
    pub session_token_attempts: u32,
    /// Argon2 memory cost in KiB (default: 19456).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
    /// Argon2 lanes (default: 1).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

/// Mailbox configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    /// Messages kept for an offline recipient (default: 64).
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,
}

/// Connection admission configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Accepts allowed per window (default: 16).
    #[serde(default = "default_admission_burst")]
    pub admission_burst: usize,
    /// Sliding window length in milliseconds (default: 100).
    #[serde(default = "default_admission_window_ms")]
    pub admission_window_ms: u64,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_login_retry_window_secs() -> u64 {
    60
}

fn default_login_retry_count() -> u32 {
    3
}

fn default_session_token_attempts() -> u32 {
    10
}

fn default_argon2_memory_kib() -> u32 {
    19 * 1024
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_argon2_parallelism() -> u32 {
    1
}

fn default_buffer_limit() -> usize {
    64
}

fn default_admission_burst() -> usize {
    16
}

fn default_admission_window_ms() -> u64 {
    100
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            legacy_bind_address: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_retry_window_secs: default_login_retry_window_secs(),
            login_retry_count: default_login_retry_count(),
            session_token_attempts: default_session_token_attempts(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            buffer_limit: default_buffer_limit(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            admission_burst: default_admission_burst(),
            admission_window_ms: default_admission_window_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl AuthConfig {
    /// Login lockout policy.
    pub fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            window: Duration::from_secs(self.login_retry_window_secs),
            max_failures: self.login_retry_count,
        }
    }

    /// Password hasher with the configured cost.
    pub fn hasher(&self) -> CoreResult<Argon2Hasher> {
        Argon2Hasher::new(
            self.argon2_memory_kib,
            self.argon2_iterations,
            self.argon2_parallelism,
        )
    }
}

impl LimitsConfig {
    /// Admission window as a duration.
    pub fn admission_window(&self) -> Duration {
        Duration::from_millis(self.admission_window_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert!(config.server.legacy_bind_address.is_none());
        assert_eq!(config.auth.login_retry_count, 3);
        assert_eq!(config.auth.session_token_attempts, 10);
        assert_eq!(config.mailbox.buffer_limit, 64);
        assert_eq!(config.limits.admission_burst, 16);
        assert_eq!(config.limits.admission_window(), Duration::from_millis(100));
        assert!(config.auth.hasher().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"
legacy_bind_address = "127.0.0.1:5001"

[auth]
login_retry_window_secs = 30
login_retry_count = 5

[mailbox]
buffer_limit = 8

[limits]
admission_burst = 4
admission_window_ms = 250

[http]
metrics_enabled = false
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(
            config.server.legacy_bind_address.as_deref(),
            Some("127.0.0.1:5001")
        );
        assert_eq!(
            config.auth.login_policy(),
            LoginPolicy {
                window: Duration::from_secs(30),
                max_failures: 5
            }
        );
        assert_eq!(config.mailbox.buffer_limit, 8);
        assert_eq!(config.limits.admission_burst, 4);
        assert_eq!(config.limits.admission_window_ms, 250);
        assert!(!config.http.metrics_enabled);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[auth]\nargon2_iterations = 3\n").unwrap();
        assert_eq!(config.auth.argon2_iterations, 3);
        assert_eq!(config.auth.argon2_memory_kib, 19 * 1024);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert!(config.http.metrics_enabled);
    }

    #[test]
    fn invalid_argon2_cost_is_rejected() {
        let config: Config = toml::from_str("[auth]\nargon2_iterations = 0\n").unwrap();
        assert!(config.auth.hasher().is_err());
    }

    #[test]
    fn from_file_reads_and_reports_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mailbox]\nbuffer_limit = 12").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.mailbox.buffer_limit, 12);

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "[mailbox\n").unwrap();
        assert!(matches!(
            Config::from_file(broken.path()),
            Err(ConfigError::ParseError { .. })
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/relay.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
