//! Event bus.
//!
//! The [`EventBus`] is the single dispatch point for events originating at
//! the event source. For each event it invokes, in order:
//!
//! 1. Core handlers, synchronously, in fixed registration order.
//! 2. Every extension subscriber for the event's kind. Each call is wrapped
//!    individually: a subscriber returning `Err` is logged with its extension
//!    id and the event kind, and dispatch continues with the next subscriber.
//! 3. The automation engine sink, if installed.
//!
//! No ordering guarantee exists between two independent extension handlers
//! beyond their subscription order.
//!
//! Subscriptions are keyed by extension id so the extension host can drop
//! them deterministically on unload.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, span, warn};

use crate::BoxError;
use crate::event::{EventKind, LiveEvent};

/// An async handler invoked by the bus.
///
/// Errors are contained at the dispatch boundary; returning `Err` never
/// stops delivery to other handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<LiveEvent>) -> Result<(), BoxError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<LiveEvent>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), BoxError>> + Send,
{
    async fn handle(&self, event: Arc<LiveEvent>) -> Result<(), BoxError> {
        (self.0)(event).await
    }
}

/// Wraps an async closure into an [`EventHandler`].
///
/// ```rust,ignore
/// bus.subscribe("my-ext", EventKind::Chat, handler_fn(|event| async move {
///     info!("chat: {:?}", event);
///     Ok(())
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<LiveEvent>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

struct Subscription {
    extension: String,
    kind: EventKind,
    handler: Arc<dyn EventHandler>,
}

/// The central event bus.
///
/// Cheap to share behind an `Arc`; handler lists are snapshotted under a
/// short read lock before any `.await`, so dispatch never holds a lock
/// across a suspension point.
#[derive(Default)]
pub struct EventBus {
    /// Core feature handlers, fixed order.
    core: RwLock<Vec<Arc<dyn EventHandler>>>,
    /// Extension subscribers in subscription order.
    subscribers: RwLock<Vec<Subscription>>,
    /// The automation engine, invoked after all other handlers.
    sink: RwLock<Option<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a core handler. Core handlers run before any extension
    /// subscriber, in the order they were registered.
    pub fn register_core(&self, handler: Arc<dyn EventHandler>) {
        self.core.write().push(handler);
    }

    /// Installs the automation engine sink. The sink runs last.
    pub fn set_sink(&self, sink: Arc<dyn EventHandler>) {
        *self.sink.write() = Some(sink);
    }

    /// Subscribes an extension handler to one event kind.
    pub fn subscribe(&self, extension: &str, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!(extension, kind = %kind, "Event subscription added");
        self.subscribers.write().push(Subscription {
            extension: extension.to_string(),
            kind,
            handler,
        });
    }

    /// Drops every subscription held by `extension`. Called by the extension
    /// host during unload.
    pub fn unsubscribe_extension(&self, extension: &str) {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|s| s.extension != extension);
        let removed = before - subs.len();
        if removed > 0 {
            debug!(extension, removed, "Event subscriptions released");
        }
    }

    /// Returns the number of live extension subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Dispatches one event through core handlers, extension subscribers,
    /// and the engine sink.
    pub async fn dispatch(&self, event: Arc<LiveEvent>) {
        let kind = event.kind();
        let span = span!(Level::DEBUG, "dispatch", kind = %kind);
        let _enter = span.enter();

        let core: Vec<_> = self.core.read().iter().cloned().collect();
        for handler in core {
            if let Err(e) = handler.handle(Arc::clone(&event)).await {
                error!(kind = %kind, error = %e, "Core handler failed");
            }
        }

        let subs: Vec<(String, Arc<dyn EventHandler>)> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| (s.extension.clone(), Arc::clone(&s.handler)))
            .collect();

        for (extension, handler) in subs {
            if let Err(e) = handler.handle(Arc::clone(&event)).await {
                warn!(
                    extension = %extension,
                    kind = %kind,
                    error = %e,
                    "Extension event handler failed"
                );
            }
        }

        let sink = self.sink.read().clone();
        if let Some(sink) = sink
            && let Err(e) = sink.handle(event).await
        {
            error!(kind = %kind, error = %e, "Engine sink failed");
        }
    }

    /// Drives the bus from an mpsc receiver until the sending side closes.
    ///
    /// This is the single cooperative dispatch loop: events are processed
    /// one at a time, in arrival order.
    pub async fn drive(&self, mut rx: mpsc::Receiver<LiveEvent>) {
        while let Some(event) = rx.recv().await {
            self.dispatch(Arc::new(event)).await;
        }
        debug!("Event channel closed, dispatch loop exiting");
    }
}
