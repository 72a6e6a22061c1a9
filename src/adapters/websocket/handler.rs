//! WebSocket upgrade handler for live feed connections.
//!
//! Connection lifecycle:
//! 1. Bearer token validated by the auth middleware
//! 2. Upgrade to WebSocket and register with the hub
//! 3. Write pump drains the hub buffer; read pump answers pings
//! 4. Either pump ending, or the hub evicting us, closes the socket
//! 5. Unregister from the hub

use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::adapters::http::middleware::RequireAuth;
use crate::domain::foundation::UserId;

use super::hub::{LiveConnectionHub, Registration};
use super::messages::{ClientEnvelope, ServerMessage};

/// Replies queued by the read pump for the write pump.
const CONTROL_CAPACITY: usize = 8;

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub hub: Arc<LiveConnectionHub>,
}

impl WebSocketState {
    pub fn new(hub: Arc<LiveConnectionHub>) -> Self {
        Self { hub }
    }
}

/// Handle WebSocket upgrade requests for the live feed.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    RequireAuth(user_id): RequireAuth,
    State(state): State<WebSocketState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(mut socket: WebSocket, user_id: UserId, state: WebSocketState) {
    let registration = match state.hub.register(user_id.clone()).await {
        Ok(registration) => registration,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Refusing live connection");
            let _ = socket.send(close_message(close_code::AWAY, "server shutting down")).await;
            return;
        }
    };

    let Registration {
        id,
        user_id,
        mut outbound,
        closed,
    } = registration;

    let (mut sender, mut receiver) = socket.split();
    let (control_tx, mut control_rx) = mpsc::channel::<Arc<str>>(CONTROL_CAPACITY);

    // Write pump: hub frames and control replies to the socket.
    let hub = Arc::clone(&state.hub);
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = closed.cancelled() => {
                    let msg = if hub.is_running() {
                        close_message(close_code::AGAIN, "outbound buffer overflow")
                    } else {
                        close_message(close_code::AWAY, "server shutting down")
                    };
                    let _ = sender.send(msg).await;
                    break;
                }
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if send_text(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(frame) = control_rx.recv() => {
                    if send_text(&mut sender, &frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read pump: parse envelopes, answer pings.
    let reader_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEnvelope>(&text) {
                    Ok(envelope) if envelope.is_ping() => {
                        if let Ok(pong) = ServerMessage::Pong.to_frame() {
                            let _ = control_tx.try_send(pong);
                        }
                    }
                    Ok(envelope) => {
                        tracing::debug!(
                            user_id = %reader_user,
                            kind = %envelope.kind,
                            "Ignoring client message"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(user_id = %reader_user, error = %e, "Malformed client message");
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::warn!(user_id = %reader_user, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Protocol-level heartbeats are answered by axum.
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(user_id = %reader_user, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(user_id = %reader_user, error = %e, "Receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(&user_id, id).await;
}

async fn send_text(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &Arc<str>,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(frame.to_string())).await
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    }))
}

/// Router exposing the live feed socket at `path`.
///
/// Authentication is applied by the caller with `auth_middleware`.
pub fn websocket_router(path: &str) -> Router<WebSocketState> {
    Router::new().route(path, get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_state_shares_hub() {
        let hub = Arc::new(LiveConnectionHub::default());
        let state = WebSocketState::new(hub.clone());
        assert!(Arc::ptr_eq(&state.hub, &hub));
    }

    #[test]
    fn websocket_router_creates_route() {
        let _router = websocket_router("/post/feed/posted");
    }

    #[test]
    fn close_message_carries_code_and_reason() {
        match close_message(close_code::AGAIN, "overflow") {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, close_code::AGAIN);
                assert_eq!(frame.reason, "overflow");
            }
            other => panic!("Expected close frame, got {:?}", other),
        }
    }
}
