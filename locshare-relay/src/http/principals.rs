//! Principal registration, password change and deletion.

use super::{authorize, parse_json, require_self, CAP_DESTROYER, CAP_INTERACTIVE};
use crate::error::ApiError;
use crate::server::LocationRelay;
use axum::{body::Bytes, extract::Path, http::HeaderMap, Extension};
use locshare_core::CoreError;
use locshare_types::{CreatePrincipalRequest, PasswordChangeRequest};
use std::sync::Arc;

/// `POST /user`
pub async fn create(
    Extension(relay): Extension<Arc<LocationRelay>>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let request: CreatePrincipalRequest = parse_json(&body)?;

    let registry = Arc::clone(&relay);
    tokio::task::spawn_blocking(move || {
        registry
            .registry()
            .register(&request.username, &request.password)
    })
    .await
    .map_err(|e| ApiError::internal(format!("registration aborted: {e}")))??;

    Ok("ok")
}

/// `POST /user/{user}/password`
pub async fn change_password(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let session = authorize(&relay, &headers, CAP_INTERACTIVE)?;
    require_self(&session, &user)?;
    let request: PasswordChangeRequest = parse_json(&body)?;
    if request.new_password.is_empty() {
        return Err(ApiError::bad_request("new password must not be empty"));
    }
    let principal = relay.registry().get(&user)?;

    tokio::task::spawn_blocking(move || {
        principal
            .credentials()
            .authenticate(&request.old_password)
            .map_err(|err| match err {
                CoreError::PermissionDenied(_) => {
                    ApiError::bad_request("old password is incorrect")
                }
                other => other.into(),
            })?;
        principal
            .credentials()
            .set_password(&request.new_password)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal(format!("password change aborted: {e}")))??;

    Ok("ok")
}

/// `DELETE /user/{user}`
pub async fn delete(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<&'static str, ApiError> {
    let session = authorize(&relay, &headers, CAP_DESTROYER)?;
    require_self(&session, &user)?;
    relay.delete_principal(&user).await?;
    Ok("ok")
}
