//! HTTP endpoints for locshare-relay.
//!
//! Every principal-scoped route authenticates with
//! `Authorization: LOCSHARE <token>` and checks one capability. Routes that
//! modify a principal additionally require the session to belong to it.

mod auth;
pub mod health;
mod keys;
mod messages;
mod metrics;
mod principals;

use crate::error::ApiError;
use crate::server::LocationRelay;
use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Extension, Router,
};
use locshare_core::Session;
use serde::de::DeserializeOwned;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub use health::HealthStatus;

/// Scheme prefix of the `Authorization` header.
pub const AUTH_SCHEME: &str = "LOCSHARE";

/// Capability for key management and subscribing.
pub const CAP_INTERACTIVE: &str = "interactive";
/// Capability for sending messages.
pub const CAP_PUBLISH: &str = "publish";
/// Capability for deleting a principal.
pub const CAP_DESTROYER: &str = "destroyer";

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<LocationRelay>) -> Router {
    let mut router = Router::new()
        .route("/auth", post(auth::login).delete(auth::logout))
        .route("/user", post(principals::create))
        .route("/user/{user}", axum::routing::delete(principals::delete))
        .route("/user/{user}/password", post(principals::change_password))
        .route(
            "/user/{user}/identity",
            get(keys::get_identity).put(keys::put_identity),
        )
        .route("/user/{user}/signedKey", get(keys::get_signed_prekey))
        .route("/user/{user}/signedKey/{keyid}", put(keys::put_signed_prekey))
        .route("/user/{user}/oneTimeKey", get(keys::pop_one_time_prekey))
        .route(
            "/user/{user}/oneTimeKey/{keyid}",
            put(keys::put_one_time_prekey).delete(keys::delete_one_time_prekey),
        )
        .route("/user/{user}/oneTimeKeys", get(keys::list_one_time_prekeys))
        .route("/user/{user}/message", put(messages::put_message))
        .route("/ws/subscribe", get(messages::subscribe))
        .route("/health", get(health::health_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router
        .layer(middleware::from_fn(count_errors))
        .layer(Extension(relay))
}

async fn count_errors(
    Extension(relay): Extension<Arc<LocationRelay>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
    }
    response
}

/// Resolve the request's session and check it carries `capability`.
pub(crate) fn authorize(
    relay: &LocationRelay,
    headers: &HeaderMap,
    capability: &str,
) -> Result<Arc<Session>, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization"))?;
    let session = relay
        .sessions()
        .lookup(token)
        .map_err(|_| ApiError::unauthorized("no such session"))?;
    session.require_capability(capability)?;
    Ok(session)
}

/// Fail unless `session` belongs to `user`.
pub(crate) fn require_self(session: &Session, user: &str) -> Result<(), ApiError> {
    if session.username() == Some(user) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("not permitted for this principal"))
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme == AUTH_SCHEME && !token.is_empty()).then_some(token)
}

/// Decode a JSON body, answering 400 on failure.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}
