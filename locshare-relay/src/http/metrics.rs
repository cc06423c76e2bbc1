//! Prometheus metrics endpoint.

use crate::server::{LocationRelay, RelayMetrics};
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges describe current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<LocationRelay>>) -> impl IntoResponse {
    let mut body = String::new();

    gauge(
        &mut body,
        "principals",
        "Registered principals",
        relay.registry().len() as u64,
    );
    gauge(
        &mut body,
        "sessions",
        "Live sessions",
        relay.sessions().len() as u64,
    );
    gauge(
        &mut body,
        "topics",
        "Open legacy topics",
        relay.topics().len() as u64,
    );
    let _ = write!(
        body,
        "# HELP locshare_relay_info Server information\n\
         # TYPE locshare_relay_info gauge\n\
         locshare_relay_info{{version=\"{}\"}} 1\n\n",
        env!("CARGO_PKG_VERSION")
    );

    for (name, help, value) in counters(relay.metrics()) {
        let _ = write!(
            body,
            "# HELP locshare_relay_{name} {help}\n\
             # TYPE locshare_relay_{name} counter\n\
             locshare_relay_{name} {}\n\n",
            value.load(Ordering::Relaxed)
        );
    }

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn gauge(body: &mut String, name: &str, help: &str, value: u64) {
    let _ = write!(
        body,
        "# HELP locshare_relay_{name} {help}\n\
         # TYPE locshare_relay_{name} gauge\n\
         locshare_relay_{name} {value}\n\n"
    );
}

fn counters(m: &RelayMetrics) -> [(&'static str, &'static str, &AtomicU64); 7] {
    [
        (
            "sessions_created_total",
            "Sessions issued by successful logins",
            &m.sessions_created,
        ),
        (
            "logins_failed_total",
            "Logins rejected for bad credentials or cool-down",
            &m.logins_failed,
        ),
        (
            "messages_published_total",
            "Messages accepted for delivery",
            &m.messages_published,
        ),
        (
            "messages_buffered_total",
            "Messages left in an unattended mailbox",
            &m.messages_buffered,
        ),
        (
            "subscriptions_total",
            "Subscription streams opened",
            &m.subscriptions_total,
        ),
        (
            "connections_legacy_total",
            "Legacy transport connections accepted",
            &m.connections_legacy,
        ),
        (
            "errors_total",
            "Requests answered with an error status",
            &m.errors_total,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_prometheus_format() {
        let metrics = RelayMetrics::default();
        metrics.logins_failed.store(4, Ordering::Relaxed);

        let rendered: Vec<String> = counters(&metrics)
            .iter()
            .map(|(name, _, value)| format!("{name} {}", value.load(Ordering::Relaxed)))
            .collect();
        assert!(rendered.contains(&"logins_failed_total 4".to_string()));
        assert!(rendered.contains(&"errors_total 0".to_string()));
    }

    #[test]
    fn gauge_has_help_and_type() {
        let mut body = String::new();
        gauge(&mut body, "sessions", "Live sessions", 2);
        assert!(body.contains("# HELP locshare_relay_sessions Live sessions"));
        assert!(body.contains("# TYPE locshare_relay_sessions gauge"));
        assert!(body.contains("locshare_relay_sessions 2"));
    }
}
