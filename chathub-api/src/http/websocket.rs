//! WebSocket upgrade endpoint and per-connection session pumps.
//!
//! Each accepted connection runs two cooperating tasks: an inbound pump that
//! reads client frames and hands them to the publish pipeline, and an
//! outbound pump that drains the connection's bounded queue back onto the
//! socket. All delivery flows through the message log; nothing is echoed
//! locally.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        FromRequestParts, Path, Query, State, WebSocketUpgrade,
    },
    http::request::Parts,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use chathub_core::models::{generate_id, ChatMessage, RoomId, UserId};

use crate::http::{AppError, AppState};

/// Time allowed to write a frame to the peer
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between frames from the peer; pong replies count
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Send pings with this period (must be shorter than `PONG_WAIT`)
const PING_PERIOD: Duration = Duration::from_secs(PONG_WAIT.as_secs() * 9 / 10);

/// Maximum frame size accepted from the peer
const MAX_MESSAGE_SIZE: usize = 4096;

/// Query parameters for the upgrade request
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token issued by the identity service
    pub token: Option<String>,
}

/// Inbound client frame: a bare content field. A frame without one is a
/// valid empty message, not a protocol error.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    content: String,
}

/// Identity extracted from the upgrade request's token.
///
/// Extraction runs before the websocket upgrade, so requests with a missing,
/// malformed, or expired token are rejected before any resource (queue,
/// registry entry) is allocated.
pub struct SessionIdentity {
    pub user_id: UserId,
    pub username: String,
}

impl FromRequestParts<AppState> for SessionIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<WsQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::bad_request("Invalid query string"))?;

        let token = query
            .token
            .ok_or_else(|| AppError::unauthorized("Authentication token is required"))?;

        let claims = state
            .jwt_service
            .verify_token(&token)
            .map_err(|e| AppError::unauthorized(format!("Invalid or expired token: {e}")))?;

        Ok(Self {
            user_id: claims.user_id(),
            username: claims.username,
        })
    }
}

/// WebSocket handler for room chat connections
///
/// Clients connect to `ws://host/ws/{room_id}?token={jwt}`.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    identity: SessionIdentity,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    if room_id.trim().is_empty() {
        return Err(AppError::bad_request("Room ID is required"));
    }

    let room_id = RoomId::from_string(room_id);

    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            handle_socket(socket, state, room_id, identity.user_id, identity.username)
        }))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    room_id: RoomId,
    user_id: UserId,
    username: String,
) {
    let connection_id = generate_id();
    let outbound = state
        .hub
        .register(room_id.clone(), user_id.clone(), connection_id.clone());

    info!(
        room_id = %room_id,
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket connection established"
    );

    let (sink, stream) = socket.split();
    let write_task = tokio::spawn(write_pump(sink, outbound));

    read_pump(stream, &state, &room_id, &user_id, &username).await;

    // Unregistration closes the outbound queue, which lets the write pump
    // send its close frame and exit.
    state.hub.unregister(&connection_id);
    let _ = write_task.await;

    info!(
        room_id = %room_id,
        user_id = %user_id,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

/// Inbound pump: client frames -> publish pipeline.
///
/// Every received frame (pongs included) resets the liveness deadline; a
/// silent peer is treated as dead. Malformed frames are dropped, the
/// connection stays open.
async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    state: &AppState,
    room_id: &RoomId,
    user_id: &UserId,
    username: &str,
) {
    loop {
        let frame = match timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                debug!(room_id = %room_id, user_id = %user_id, "Liveness deadline exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(err))) => {
                debug!(room_id = %room_id, user_id = %user_id, error = %err, "WebSocket read failed");
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                handle_inbound(state, room_id, user_id, username, text.as_bytes()).await;
            }
            Message::Binary(data) => {
                handle_inbound(state, room_id, user_id, username, &data).await;
            }
            Message::Close(_) => return,
            // Ping replies are handled by axum; receipt alone keeps the
            // connection alive.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// Parse a client frame and stamp it into a full message.
///
/// Malformed frames yield `None`; the session logs them and keeps reading
/// rather than tearing the connection down.
fn build_message(
    room_id: &RoomId,
    user_id: &UserId,
    username: &str,
    data: &[u8],
) -> Option<ChatMessage> {
    match serde_json::from_slice::<InboundFrame>(data) {
        Ok(frame) => Some(ChatMessage::new(
            room_id.clone(),
            user_id.clone(),
            username.to_string(),
            frame.content,
        )),
        Err(err) => {
            warn!(room_id = %room_id, user_id = %user_id, error = %err, "Malformed client frame, dropping");
            None
        }
    }
}

async fn handle_inbound(
    state: &AppState,
    room_id: &RoomId,
    user_id: &UserId,
    username: &str,
    data: &[u8],
) {
    let Some(message) = build_message(room_id, user_id, username, data) else {
        return;
    };

    // Publish failure does not close the connection; the client may retry.
    if let Err(err) = state.publisher.publish(&message).await {
        warn!(
            message_id = %message.id,
            room_id = %room_id,
            error = %err,
            "Failed to publish message"
        );
    }
}

/// Outbound pump: bounded queue -> socket, with periodic pings.
///
/// Exits when the hub closes the queue (sending a close frame first) or on
/// any write failure or deadline.
async fn write_pump(mut sink: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<ChatMessage>) {
    let start = Instant::now() + PING_PERIOD;
    let mut ping = interval_at(start, PING_PERIOD);

    loop {
        tokio::select! {
            maybe_message = outbound.recv() => match maybe_message {
                Some(message) => {
                    let payload = match serde_json::to_string(&message) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(message_id = %message.id, error = %err, "Failed to serialize message");
                            continue;
                        }
                    };
                    match timeout(WRITE_WAIT, sink.send(Message::Text(payload.into()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            debug!(error = %err, "WebSocket write failed");
                            return;
                        }
                        Err(_) => {
                            debug!("WebSocket write deadline exceeded");
                            return;
                        }
                    }
                }
                None => {
                    // The hub closed the queue
                    let _ = timeout(WRITE_WAIT, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => {
                match timeout(WRITE_WAIT, sink.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    _ => {
                        debug!("WebSocket ping failed");
                        return;
                    }
                }
            }
        }
    }
}
