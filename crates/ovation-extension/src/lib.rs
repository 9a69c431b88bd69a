//! # Ovation Extension
//!
//! The extension runtime: manifest discovery, capability-scoped loading,
//! lifecycle management, and packaging.
//!
//! ## Model
//!
//! An extension is a trait object ([`Extension`]) constructed by a factory
//! the manifest's `entry` field names, and initialized with an injected
//! [`Capabilities`] facade — the only interface through which it may affect
//! the host. The facade's operations are gated by the [`CapabilityGrant`]
//! derived from the manifest's declared permissions.
//!
//! ```text
//! manifest.json ─▶ discover() ─▶ ExtensionHost ─▶ factory(entry)
//!                                     │               │
//!                                     ▼               ▼
//!                               state machine    Extension::init(caps)
//!                                                      │
//!                          routes / events / channels / config / registries
//! ```
//!
//! Failures are isolated per extension: one bad manifest, constructor, or
//! init hook never prevents other extensions from loading.

pub mod capability;
pub mod channels;
pub mod error;
pub mod extension;
pub mod installer;
pub mod manifest;
pub mod routes;
pub mod runtime;
pub mod state;

pub use capability::{
    Capabilities, CapabilityError, CapabilityGrant, HostServices, LogBuffer, LogEntry, Permission,
};
pub use channels::{ChannelFrame, ChannelHandler, ChannelHub, ConnectionId};
pub use error::{ExtensionError, ExtensionResult};
pub use extension::{Extension, ExtensionFactory, ExtensionState};
pub use installer::Installer;
pub use manifest::{ExtensionManifest, MANIFEST_FILE};
pub use routes::{RouteError, RouteHandler, RouteInfo, RouteRequest, RouteTable};
pub use runtime::{ExtensionHost, ExtensionInfo, HostConfig};
pub use state::{ExtensionStateEntry, StateFile};
