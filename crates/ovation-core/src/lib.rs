//! # Ovation Core
//!
//! The core engine of the Ovation live-event companion.
//!
//! This crate provides the fundamental building blocks shared by every other
//! Ovation crate:
//!
//! - **Event model**: a closed set of live-event kinds with typed payloads
//!   ([`LiveEvent`], [`EventKind`])
//! - **Event bus**: the single dispatch point for incoming events
//!   ([`EventBus`], [`EventHandler`])
//! - **Source contract**: the adapter interface a live platform implements
//!   ([`EventSource`], [`EventSink`])
//! - **Settings store**: namespaced key→JSON persistence ([`SettingsStore`])
//!
//! ## Hub-and-Spoke Dispatch
//!
//! All events flow through the central [`EventBus`]:
//!
//! ```text
//! ┌──────────────┐     ┌──────────┐     ┌──────────────────────┐
//! │ Event Source │────▶│ EventBus │────▶│ core handlers        │
//! │  (platform)  │     │          │────▶│ extension handlers   │
//! └──────────────┘     └──────────┘────▶│ flow engine sink     │
//!                                       └──────────────────────┘
//! ```
//!
//! Core handlers run first in a fixed order, then every extension subscriber
//! for the event's kind (each isolated so one failing handler cannot stop
//! delivery), and finally the automation engine sink.

pub mod bus;
pub mod event;
pub mod settings;
pub mod source;

pub use bus::{EventBus, EventHandler, handler_fn};
pub use event::{
    Actor, ChatEvent, ConnectionEvent, EventKind, FollowEvent, GiftEvent, LikeEvent, LiveEvent,
    ParseEventKindError, ShareEvent, SourceErrorEvent, SubscribeEvent, ViewerCountEvent,
};
pub use settings::{SettingsError, SettingsStore};
pub use source::{EventSink, EventSource, ScriptedSource, SourceError, SourceResult};

/// Type-erased error used at handler boundaries.
///
/// Handlers return `Result<(), BoxError>`; the bus and the capability layer
/// catch these at the dispatch boundary and log them without letting the
/// failure propagate into the host.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed future, as returned by handler closures.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;
