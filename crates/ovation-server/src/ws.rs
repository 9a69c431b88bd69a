//! WebSocket transport for the channel hub.
//!
//! One socket per dashboard/overlay client. Inbound frames are
//! `{"type": "message", "channel": "extensionId:eventName", "payload": …}`;
//! outbound frames are the hub's [`ChannelFrame`]s (`event` and
//! `plugin:error`). The hub registration is released when the socket
//! closes, so connection-scoped state never outlives the connection.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::state::AppState;

/// Inbound client frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    /// Send a payload to a channel handler.
    Message {
        channel: String,
        #[serde(default)]
        payload: Value,
    },
}

/// `GET /ws` upgrade handler.
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn_id, mut outbound) = state.hub.connect();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize channel frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Message { channel, payload }) => {
                                state.hub.handle_message(conn_id, &channel, payload).await;
                            }
                            Err(e) => {
                                debug!(connection = conn_id, error = %e, "Ignoring malformed client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary ignored
                    Some(Err(e)) => {
                        debug!(connection = conn_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.disconnect(conn_id);
}
