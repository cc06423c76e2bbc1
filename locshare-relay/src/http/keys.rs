//! Key-exchange endpoints.
//!
//! Reads are open to any interactive session; uploads and listing require
//! the session to own the key store.

use super::{authorize, require_self, CAP_INTERACTIVE};
use crate::error::ApiError;
use crate::server::LocationRelay;
use axum::{body::Bytes, extract::Path, http::HeaderMap, Extension, Json};
use locshare_core::{Prekey, Principal};
use locshare_types::{KeyResponse, OneTimeKeysResponse};
use std::sync::Arc;

fn parse_key_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found("no such key"))
}

fn key_response(prekey: Prekey) -> Json<KeyResponse> {
    Json(KeyResponse {
        key_id: prekey.id,
        key: prekey.key.to_vec(),
    })
}

/// Authorize an interactive request against `user`, optionally as its owner.
fn target(
    relay: &LocationRelay,
    headers: &HeaderMap,
    user: &str,
    owner_only: bool,
) -> Result<Arc<Principal>, ApiError> {
    let session = authorize(relay, headers, CAP_INTERACTIVE)?;
    if owner_only {
        require_self(&session, user)?;
    }
    Ok(relay.registry().get(user)?)
}

/// `GET /user/{user}/identity`
pub async fn get_identity(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<Bytes, ApiError> {
    let principal = target(&relay, &headers, &user, false)?;
    Ok(principal.keys().identity()?)
}

/// `PUT /user/{user}/identity`
pub async fn put_identity(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let principal = target(&relay, &headers, &user, true)?;
    principal.keys().set_identity(body);
    Ok("ok")
}

/// `GET /user/{user}/signedKey`
pub async fn get_signed_prekey(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<Json<KeyResponse>, ApiError> {
    let principal = target(&relay, &headers, &user, false)?;
    Ok(key_response(principal.keys().signed_prekey()?))
}

/// `PUT /user/{user}/signedKey/{keyid}`
pub async fn put_signed_prekey(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path((user, key_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let principal = target(&relay, &headers, &user, true)?;
    let key_id = parse_key_id(&key_id)?;
    principal.keys().set_signed_prekey(key_id, body);
    Ok("ok")
}

/// `PUT /user/{user}/oneTimeKey/{keyid}`
pub async fn put_one_time_prekey(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path((user, key_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let principal = target(&relay, &headers, &user, true)?;
    let key_id = parse_key_id(&key_id)?;
    principal.keys().add_one_time_prekey(key_id, body)?;
    Ok("ok")
}

/// `DELETE /user/{user}/oneTimeKey/{keyid}`
pub async fn delete_one_time_prekey(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path((user, key_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<&'static str, ApiError> {
    let principal = target(&relay, &headers, &user, true)?;
    let key_id = parse_key_id(&key_id)?;
    principal.keys().remove_one_time_prekey(key_id)?;
    Ok("ok")
}

/// `GET /user/{user}/oneTimeKey`: consume the oldest one-time prekey.
pub async fn pop_one_time_prekey(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<Json<KeyResponse>, ApiError> {
    let principal = target(&relay, &headers, &user, false)?;
    Ok(key_response(principal.keys().pop_one_time_prekey()?))
}

/// `GET /user/{user}/oneTimeKeys`
pub async fn list_one_time_prekeys(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OneTimeKeysResponse>, ApiError> {
    let principal = target(&relay, &headers, &user, true)?;
    Ok(Json(OneTimeKeysResponse {
        keys: principal.keys().one_time_prekey_ids(),
    }))
}
