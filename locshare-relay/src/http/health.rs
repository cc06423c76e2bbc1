//! `/health`: liveness plus a few occupancy figures.

use crate::server::LocationRelay;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Record process start. Later calls keep the first instant.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

/// Whole seconds since [`mark_started`], or zero if it never ran.
fn uptime_seconds() -> u64 {
    STARTED.get().map_or(0, |started| started.elapsed().as_secs())
}

/// Body of a `/health` answer.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the relay answers.
    pub status: &'static str,
    /// Crate version of the running binary.
    pub version: &'static str,
    /// Registered principals.
    pub principals: usize,
    /// Sessions still in the token index.
    pub sessions: usize,
    /// Legacy topics with at least one subscriber.
    pub topics: usize,
    /// Seconds since startup.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    fn of(relay: &LocationRelay) -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            principals: relay.registry().len(),
            sessions: relay.sessions().len(),
            topics: relay.topics().len(),
            uptime_seconds: uptime_seconds(),
        }
    }
}

/// `GET /health`
pub async fn health_handler(
    Extension(relay): Extension<Arc<LocationRelay>>,
) -> Json<HealthStatus> {
    Json(HealthStatus::of(&relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::test_relay;

    #[test]
    fn reports_relay_occupancy() {
        let relay = test_relay();
        relay.registry().register("bob", "pw").unwrap();
        relay.sessions().create(["interactive"]).unwrap();

        let status = HealthStatus::of(&relay);
        assert_eq!(status.status, "ok");
        assert_eq!((status.principals, status.sessions, status.topics), (1, 1, 0));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["principals"], 1);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn uptime_counts_from_first_mark() {
        mark_started();
        let first = *STARTED.get().unwrap();
        mark_started();
        assert_eq!(*STARTED.get().unwrap(), first);
        assert!(uptime_seconds() < 60);
    }
}
