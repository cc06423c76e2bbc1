//! Session creation and logout.

use super::{bearer_token, parse_json};
use crate::error::ApiError;
use crate::server::LocationRelay;
use axum::{body::Bytes, http::HeaderMap, Extension};
use locshare_core::CoreError;
use locshare_types::AuthRequest;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

/// `POST /auth`: verify credentials and answer with a fresh token.
pub async fn login(
    Extension(relay): Extension<Arc<LocationRelay>>,
    body: Bytes,
) -> Result<String, ApiError> {
    let request: AuthRequest = parse_json(&body)?;
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    if request.capabilities.is_empty() {
        return Err(ApiError::bad_request("at least one capability is required"));
    }

    let principal = match relay.registry().get(&request.username) {
        Ok(principal) => principal,
        Err(_) => {
            relay.metrics().logins_failed.fetch_add(1, Ordering::Relaxed);
            warn!(principal = %request.username, "login for unknown principal");
            return Err(ApiError::unauthorized("authentication failed"));
        }
    };

    let password = request.password;
    let checked = Arc::clone(&principal);
    let verdict = tokio::task::spawn_blocking(move || checked.credentials().authenticate(&password))
        .await
        .map_err(|e| ApiError::internal(format!("credential check aborted: {e}")))?;

    if let Err(err) = verdict {
        relay.metrics().logins_failed.fetch_add(1, Ordering::Relaxed);
        if err == CoreError::RateLimited {
            warn!(principal = principal.name(), "login rate limited");
        }
        return Err(err.into());
    }

    let session = relay.sessions().create(request.capabilities)?;
    session.bind_username(principal.name())?;

    // A deletion that ran during the password check has already swept the
    // principal's sessions, so this one must not outlive it.
    let current = relay.registry().get(principal.name()).ok();
    if !current.is_some_and(|current| Arc::ptr_eq(&current, &principal)) {
        // The token is still indexed unless a sweep already removed it.
        let _ = relay.sessions().delete(session.token());
        relay.metrics().logins_failed.fetch_add(1, Ordering::Relaxed);
        warn!(principal = principal.name(), "principal removed during login");
        return Err(ApiError::unauthorized("authentication failed"));
    }
    relay.metrics().sessions_created.fetch_add(1, Ordering::Relaxed);
    info!(principal = principal.name(), "session created");

    Ok(session.token().to_string())
}

/// `DELETE /auth`: invalidate the presented session.
pub async fn logout(
    Extension(relay): Extension<Arc<LocationRelay>>,
    headers: HeaderMap,
) -> Result<&'static str, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization"))?;
    relay
        .sessions()
        .delete(token)
        .map_err(|_| ApiError::unauthorized("no such session"))?;
    Ok("ok")
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::http::build_router;
    use crate::server::LocationRelay;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use locshare_core::{
        CoreResult, CredentialHasher, LoginPolicy, OsTokenSource, PrincipalSettings,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    /// Verification takes long enough for a deletion to slip in.
    #[derive(Debug)]
    struct SlowHasher;

    impl CredentialHasher for SlowHasher {
        fn hash(&self, password: &str) -> CoreResult<String> {
            Ok(format!("slow:{password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            std::thread::sleep(Duration::from_millis(300));
            hash == format!("slow:{password}")
        }
    }

    fn slow_relay() -> Arc<LocationRelay> {
        let settings = PrincipalSettings {
            hasher: Arc::new(SlowHasher),
            login_policy: LoginPolicy::default(),
            buffer_limit: 64,
        };
        Arc::new(LocationRelay::with_settings(
            Config::default(),
            settings,
            Arc::new(OsTokenSource),
        ))
    }

    #[tokio::test]
    async fn login_racing_deletion_yields_no_session() {
        let relay = slow_relay();
        relay.registry().register("bob", "pw").unwrap();
        let app = build_router(Arc::clone(&relay));

        let body = json!({
            "username": "bob",
            "password": "pw",
            "capabilities": ["interactive"],
        });
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth")
            .body(Body::from(body.to_string()))
            .unwrap();
        let login = tokio::spawn(app.oneshot(request));

        tokio::time::sleep(Duration::from_millis(100)).await;
        relay.delete_principal("bob").await.unwrap();
        relay.registry().register("bob", "other").unwrap();

        let response = login.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(relay.sessions().is_empty());
    }
}
