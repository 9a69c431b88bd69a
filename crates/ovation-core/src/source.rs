//! Event source adapter contract.
//!
//! A live platform integration implements [`EventSource`] and pushes typed
//! [`LiveEvent`]s into an [`EventSink`]. The runtime owns the task the
//! source runs on and hands it a cancellation token for shutdown.
//!
//! Connection lifecycle (connected / disconnected / source errors) is
//! reported through the same sink as audience events, so downstream
//! consumers observe a single ordered stream.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::event::LiveEvent;

/// Errors a source may surface to the runtime.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Establishing or keeping the platform connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The platform sent something the adapter could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The event channel closed while the source was still producing.
    #[error("event sink closed")]
    SinkClosed,
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Sending half of the event pipeline.
///
/// Cloneable; each send suspends until the dispatch loop has capacity, which
/// backpressures a bursty source instead of buffering unboundedly.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<LiveEvent>,
}

impl EventSink {
    /// Creates a sink and the receiver the dispatch loop consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Pushes one event toward the bus.
    pub async fn send(&self, event: LiveEvent) -> SourceResult<()> {
        self.tx.send(event).await.map_err(|_| SourceError::SinkClosed)
    }

    /// Pushes one event, logging instead of failing when the loop is gone.
    /// Convenient for sources that emit from drop/teardown paths.
    pub async fn send_lossy(&self, event: LiveEvent) {
        if self.tx.send(event).await.is_err() {
            warn!("Event dropped: dispatch loop is no longer running");
        }
    }
}

/// The adapter contract a live platform implements.
///
/// `run` owns the connection for its whole lifetime: it should emit
/// `Connected` once the platform handshake completes, forward events until
/// the token is cancelled or the platform disconnects, and emit
/// `Disconnected` on the way out.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short adapter name used in logs.
    fn name(&self) -> &str;

    /// Runs the source until cancellation or a fatal error.
    async fn run(&self, sink: EventSink, shutdown: CancellationToken) -> SourceResult<()>;
}

// ============================================================================
// Scripted source
// ============================================================================

/// A source that replays a fixed list of events, then idles until shutdown.
///
/// Used by the demos and by integration tests that need a deterministic
/// stream without a live platform.
pub struct ScriptedSource {
    events: Vec<LiveEvent>,
}

impl ScriptedSource {
    pub fn new(events: Vec<LiveEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, sink: EventSink, shutdown: CancellationToken) -> SourceResult<()> {
        for event in self.events.iter().cloned() {
            if shutdown.is_cancelled() {
                break;
            }
            sink.send(event).await?;
        }
        shutdown.cancelled().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Actor, ChatEvent, EventKind};
    use chrono::Utc;

    #[tokio::test]
    async fn scripted_source_replays_in_order() {
        let events = vec![
            LiveEvent::Chat(ChatEvent {
                actor: Actor {
                    user_id: "u1".into(),
                    username: "a".into(),
                },
                message: "one".into(),
                timestamp: Utc::now(),
            }),
            LiveEvent::Chat(ChatEvent {
                actor: Actor {
                    user_id: "u2".into(),
                    username: "b".into(),
                },
                message: "two".into(),
                timestamp: Utc::now(),
            }),
        ];

        let (sink, mut rx) = EventSink::channel(8);
        let token = CancellationToken::new();
        let source = ScriptedSource::new(events);

        let run_token = token.clone();
        let task = tokio::spawn(async move { source.run(sink, run_token).await });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind(), EventKind::Chat);
        assert_eq!(second.kind(), EventKind::Chat);

        token.cancel();
        task.await.unwrap().unwrap();
    }
}
