//! Channel hub.
//!
//! Channels are the push surface between extensions and connected dashboard
//! or overlay clients. Names are namespaced `extensionId:eventName`. A
//! channel handler runs when any connection sends a message on its channel;
//! a handler failure is reported as a `plugin:error` frame **to the
//! originating connection only** — the connection stays open and other
//! connections never see it.
//!
//! Connection state is scoped to the connection's lifetime: `disconnect`
//! releases it deterministically, unlike process-lifetime resources.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ovation_core::BoxError;

/// Identifier for one live client connection.
pub type ConnectionId = u64;

/// Outbound frame pushed to channel clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelFrame {
    /// A channel payload (reply or broadcast).
    Event { channel: String, payload: Value },
    /// A channel handler failed while processing this connection's message.
    #[serde(rename = "plugin:error")]
    PluginError {
        extension: String,
        event: String,
        message: String,
    },
}

/// An extension-provided channel handler.
///
/// Returning `Ok(Some(value))` sends an event frame back to the
/// originating connection; `Ok(None)` sends nothing.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<Option<Value>, BoxError>;
}

#[derive(Clone)]
struct ChannelEntry {
    extension: String,
    handler: Arc<dyn ChannelHandler>,
}

/// Registry of channel handlers plus the set of live connections.
#[derive(Default)]
pub struct ChannelHub {
    /// Fully-qualified channel name → handler.
    handlers: RwLock<HashMap<String, ChannelEntry>>,
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ChannelFrame>>>,
    next_id: AtomicU64,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `extensionId:name` for `extension`. Last registration wins,
    /// with a logged notice.
    pub fn register(&self, extension: &str, name: &str, handler: Arc<dyn ChannelHandler>) {
        let channel = format!("{extension}:{name}");
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&channel) {
            warn!(channel = %channel, "Channel re-registered, previous handler replaced");
        }
        debug!(channel = %channel, "Channel registered");
        handlers.insert(
            channel,
            ChannelEntry {
                extension: extension.to_string(),
                handler,
            },
        );
    }

    /// Removes every channel handler owned by `extension`; returns how many.
    pub fn remove_extension(&self, extension: &str) -> usize {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|_, entry| entry.extension != extension);
        let removed = before - handlers.len();
        if removed > 0 {
            debug!(extension, removed, "Channel handlers released");
        }
        removed
    }

    /// Registers a new client connection; the receiver yields the frames
    /// destined for it.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ChannelFrame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().insert(id, tx);
        debug!(connection = id, "Channel connection opened");
        (id, rx)
    }

    /// Releases a connection's state. Called when the socket closes.
    pub fn disconnect(&self, id: ConnectionId) {
        self.connections.write().remove(&id);
        debug!(connection = id, "Channel connection closed");
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    fn send_to(&self, id: ConnectionId, frame: ChannelFrame) {
        let connections = self.connections.read();
        if let Some(tx) = connections.get(&id)
            && tx.send(frame).is_err()
        {
            debug!(connection = id, "Dropped frame for closed connection");
        }
    }

    /// Handles an inbound message from `origin` on `channel`.
    ///
    /// Any failure — unknown channel or a handler error — is reported back
    /// to `origin` only.
    pub async fn handle_message(&self, origin: ConnectionId, channel: &str, payload: Value) {
        let Some((extension, event)) = channel.split_once(':') else {
            self.send_to(
                origin,
                ChannelFrame::PluginError {
                    extension: String::new(),
                    event: channel.to_string(),
                    message: "channel names are 'extensionId:eventName'".into(),
                },
            );
            return;
        };

        let entry = self.handlers.read().get(channel).cloned();
        let Some(entry) = entry else {
            self.send_to(
                origin,
                ChannelFrame::PluginError {
                    extension: extension.to_string(),
                    event: event.to_string(),
                    message: format!("no handler registered for channel '{channel}'"),
                },
            );
            return;
        };

        match entry.handler.handle(payload).await {
            Ok(Some(reply)) => self.send_to(
                origin,
                ChannelFrame::Event {
                    channel: channel.to_string(),
                    payload: reply,
                },
            ),
            Ok(None) => {}
            Err(e) => {
                warn!(channel = %channel, error = %e, "Channel handler failed");
                self.send_to(
                    origin,
                    ChannelFrame::PluginError {
                        extension: entry.extension.clone(),
                        event: event.to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    /// Pushes a payload to **all** connected clients.
    pub fn broadcast(&self, channel: &str, payload: Value) {
        let connections = self.connections.read();
        for tx in connections.values() {
            let _ = tx.send(ChannelFrame::Event {
                channel: channel.to_string(),
                payload: payload.clone(),
            });
        }
    }
}

/// The flow engine's `broadcast` action pushes through the hub.
impl ovation_flow::Broadcaster for ChannelHub {
    fn broadcast(&self, channel: &str, payload: Value) {
        ChannelHub::broadcast(self, channel, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl ChannelHandler for Upper {
        async fn handle(&self, payload: Value) -> Result<Option<Value>, BoxError> {
            let text = payload.as_str().ok_or("expected a string")?;
            Ok(Some(json!(text.to_uppercase())))
        }
    }

    #[tokio::test]
    async fn reply_goes_to_origin() {
        let hub = ChannelHub::new();
        hub.register("greeter", "hello", Arc::new(Upper));

        let (id, mut rx) = hub.connect();
        hub.handle_message(id, "greeter:hello", json!("hi")).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            ChannelFrame::Event {
                channel: "greeter:hello".into(),
                payload: json!("HI"),
            }
        );
    }

    #[tokio::test]
    async fn handler_error_hits_origin_only() {
        let hub = ChannelHub::new();
        hub.register("greeter", "hello", Arc::new(Upper));

        let (origin, mut origin_rx) = hub.connect();
        let (_other, mut other_rx) = hub.connect();

        // Payload is not a string, so the handler errors.
        hub.handle_message(origin, "greeter:hello", json!(42)).await;

        match origin_rx.recv().await.unwrap() {
            ChannelFrame::PluginError {
                extension, event, ..
            } => {
                assert_eq!(extension, "greeter");
                assert_eq!(event, "hello");
            }
            other => panic!("expected plugin:error, got {other:?}"),
        }
        assert!(other_rx.try_recv().is_err());

        // The origin connection is still usable.
        hub.handle_message(origin, "greeter:hello", json!("ok")).await;
        assert!(matches!(
            origin_rx.recv().await.unwrap(),
            ChannelFrame::Event { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_channel_reports_to_origin() {
        let hub = ChannelHub::new();
        let (id, mut rx) = hub.connect();
        hub.handle_message(id, "ghost:event", json!(null)).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            ChannelFrame::PluginError { .. }
        ));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let hub = ChannelHub::new();
        let (_a, mut rx_a) = hub.connect();
        let (_b, mut rx_b) = hub.connect();

        hub.broadcast("greeter:tick", json!(1));

        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ChannelFrame::Event { .. }
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ChannelFrame::Event { .. }
        ));
    }

    #[tokio::test]
    async fn disconnect_releases_state() {
        let hub = ChannelHub::new();
        let (id, _rx) = hub.connect();
        assert_eq!(hub.connection_count(), 1);
        hub.disconnect(id);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn plugin_error_frame_serializes_with_namespaced_tag() {
        let frame = ChannelFrame::PluginError {
            extension: "greeter".into(),
            event: "hello".into(),
            message: "boom".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "plugin:error");
    }
}
