//! Message publishing and the WebSocket subscription stream.

use super::{authorize, CAP_INTERACTIVE, CAP_PUBLISH};
use crate::error::ApiError;
use crate::server::LocationRelay;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message as Frame, WebSocket, WebSocketUpgrade},
        Path,
    },
    http::HeaderMap,
    response::Response,
    Extension,
};
use locshare_core::{Principal, Session};
use locshare_types::DeliveredMessage;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `PUT /user/{user}/message`: the body is ciphertext for `user`.
///
/// Blocks while any of the recipient's subscribers has a full queue.
pub async fn put_message(
    Extension(relay): Extension<Arc<LocationRelay>>,
    Path(user): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let session = authorize(&relay, &headers, CAP_PUBLISH)?;
    let source = session
        .username()
        .ok_or_else(|| ApiError::unauthorized("session has no principal"))?;
    relay.publish(&user, source, body).await?;
    Ok("ok")
}

/// `GET /ws/subscribe`: stream the session owner's mailbox.
pub async fn subscribe(
    Extension(relay): Extension<Arc<LocationRelay>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let session = authorize(&relay, &headers, CAP_INTERACTIVE)?;
    let name = session
        .username()
        .ok_or_else(|| ApiError::unauthorized("session has no principal"))?;
    let principal = relay.registry().get(name)?;

    Ok(ws.on_upgrade(move |socket| stream_mailbox(socket, relay, session, principal)))
}

/// Forward mailbox deliveries as JSON text frames.
///
/// Ends when the mailbox is torn down, the session is found invalid at a
/// delivery, the client goes away, or a write fails. Always unsubscribes.
async fn stream_mailbox(
    mut socket: WebSocket,
    relay: Arc<LocationRelay>,
    session: Arc<Session>,
    principal: Arc<Principal>,
) {
    let mut subscription = principal.mailbox().subscribe().await;
    relay
        .metrics()
        .subscriptions_total
        .fetch_add(1, Ordering::Relaxed);
    info!(principal = principal.name(), "subscription opened");

    loop {
        tokio::select! {
            delivery = subscription.recv() => {
                let Some(message) = delivery else {
                    debug!(principal = principal.name(), "mailbox closed");
                    break;
                };
                if !session.is_valid() {
                    debug!(principal = principal.name(), "session invalidated");
                    break;
                }

                let frame = DeliveredMessage {
                    source: message.source,
                    content: message.content.to_vec(),
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "cannot encode delivery");
                        break;
                    }
                };
                if let Err(e) = socket.send(Frame::Text(text.into())).await {
                    warn!(principal = principal.name(), error = %e, "subscription write failed");
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Frame::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    if let Err(e) = principal.mailbox().unsubscribe(subscription).await {
        debug!(error = %e, "subscription already detached");
    }
    // Best effort; the peer may already be gone.
    let _ = socket.send(Frame::Close(None)).await;
    info!(principal = principal.name(), "subscription closed");
}
