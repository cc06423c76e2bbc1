//! Main LocationRelay coordination.
//!
//! LocationRelay owns the principal registry, the session store and the
//! legacy topic broker, and binds the listeners that front them.

use crate::config::Config;
use crate::error::Result;
use crate::http;
use crate::legacy::{self, TopicBroker};
use crate::limits::{AdmissionLimiter, PacedListener};
use bytes::Bytes;
use locshare_core::{
    CoreResult, Delivery, Message, OsTokenSource, PrincipalSettings, Registry, SessionStore,
    TokenSource,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Sessions issued by successful logins.
    pub sessions_created: AtomicU64,
    /// Logins rejected for bad credentials or cool-down.
    pub logins_failed: AtomicU64,
    /// Messages accepted for delivery.
    pub messages_published: AtomicU64,
    /// Messages that landed in an unattended mailbox.
    pub messages_buffered: AtomicU64,
    /// Subscription streams opened.
    pub subscriptions_total: AtomicU64,
    /// Legacy transport connections accepted.
    pub connections_legacy: AtomicU64,
    /// Requests answered with an error status.
    pub errors_total: AtomicU64,
}

/// Main relay server.
pub struct LocationRelay {
    config: Config,
    registry: Registry,
    sessions: SessionStore,
    topics: TopicBroker,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for LocationRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationRelay")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("principals", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl LocationRelay {
    /// Create a relay from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configured password hashing cost is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let settings = PrincipalSettings {
            hasher: Arc::new(config.auth.hasher()?),
            login_policy: config.auth.login_policy(),
            buffer_limit: config.mailbox.buffer_limit,
        };
        let sessions = SessionStore::new(
            Arc::new(OsTokenSource),
            config.auth.session_token_attempts,
        );
        Ok(Self::from_parts(config, settings, sessions))
    }

    /// Create a relay with explicit principal settings and token source.
    pub fn with_settings(
        config: Config,
        settings: PrincipalSettings,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let sessions = SessionStore::new(tokens, config.auth.session_token_attempts);
        Self::from_parts(config, settings, sessions)
    }

    fn from_parts(config: Config, settings: PrincipalSettings, sessions: SessionStore) -> Self {
        let topics = TopicBroker::new(config.mailbox.buffer_limit);
        Self {
            config,
            registry: Registry::new(settings),
            sessions,
            topics,
            metrics: RelayMetrics::default(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the principal registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Get the legacy transport's topics.
    pub fn topics(&self) -> &TopicBroker {
        &self.topics
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Deliver `content` from `source` to `recipient`'s mailbox.
    pub async fn publish(
        &self,
        recipient: &str,
        source: &str,
        content: Bytes,
    ) -> CoreResult<Delivery> {
        let principal = self.registry.get(recipient)?;
        let bytes = content.len();
        let delivery = principal.mailbox().publish(Message::new(source, content)).await;

        self.metrics.messages_published.fetch_add(1, Ordering::Relaxed);
        if delivery == Delivery::Buffered {
            self.metrics.messages_buffered.fetch_add(1, Ordering::Relaxed);
        }
        debug!(recipient, source, bytes, ?delivery, "published message");
        Ok(delivery)
    }

    /// Remove a principal, tear down its mailbox and invalidate its sessions.
    pub async fn delete_principal(&self, name: &str) -> CoreResult<()> {
        self.registry.remove(name).await?;
        self.sessions.invalidate_principal(name);
        Ok(())
    }
}

/// Bind the configured listeners and serve until Ctrl-C.
///
/// # Errors
///
/// Fails if a listener cannot be bound or the HTTP server stops with an error.
pub async fn run(relay: Arc<LocationRelay>) -> Result<()> {
    let config = relay.config().clone();
    let limiter =
        || AdmissionLimiter::new(config.limits.admission_burst, config.limits.admission_window());

    if let Some(addr) = &config.server.legacy_bind_address {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "legacy transport listening");
        tokio::spawn(legacy::serve(
            PacedListener::new(listener, limiter()),
            Arc::clone(&relay),
        ));
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    info!(addr = %listener.local_addr()?, "HTTP listening");

    axum::serve(
        PacedListener::new(listener, limiter()),
        http::build_router(relay),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use locshare_core::{Argon2Hasher, CoreError, Entity, LoginPolicy};

    /// A relay with cheap password hashing.
    pub(crate) fn test_relay() -> Arc<LocationRelay> {
        let settings = PrincipalSettings {
            hasher: Arc::new(Argon2Hasher::new(8, 1, 1).unwrap()),
            login_policy: LoginPolicy::default(),
            buffer_limit: 64,
        };
        Arc::new(LocationRelay::with_settings(
            Config::default(),
            settings,
            Arc::new(OsTokenSource),
        ))
    }

    #[test]
    fn relay_from_default_config() {
        let relay = LocationRelay::new(Config::default()).unwrap();
        assert!(relay.registry().is_empty());
        assert!(relay.sessions().is_empty());
    }

    #[test]
    fn relay_rejects_bad_hash_cost() {
        let mut config = Config::default();
        config.auth.argon2_iterations = 0;
        assert!(LocationRelay::new(config).is_err());
    }

    #[tokio::test]
    async fn publish_counts_buffered_messages() {
        let relay = test_relay();
        relay.registry().register("bob", "pw").unwrap();

        let delivery = relay
            .publish("bob", "alice", Bytes::from_static(b"C"))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Buffered);
        assert_eq!(relay.metrics().messages_published.load(Ordering::Relaxed), 1);
        assert_eq!(relay.metrics().messages_buffered.load(Ordering::Relaxed), 1);

        assert_eq!(
            relay
                .publish("carol", "alice", Bytes::from_static(b"C"))
                .await
                .unwrap_err(),
            CoreError::NotFound(Entity::Principal)
        );
    }

    #[tokio::test]
    async fn delete_principal_invalidates_its_sessions() {
        let relay = test_relay();
        relay.registry().register("bob", "pw").unwrap();
        let bob = relay.sessions().create(["interactive"]).unwrap();
        bob.bind_username("bob").unwrap();
        let alice = relay.sessions().create(["interactive"]).unwrap();
        alice.bind_username("alice").unwrap();

        relay.delete_principal("bob").await.unwrap();

        assert!(!bob.is_valid());
        assert!(relay.sessions().lookup(bob.token()).is_err());
        assert!(alice.is_valid());
        assert!(!relay.registry().contains("bob"));
        assert!(relay.delete_principal("bob").await.is_err());
    }
}
