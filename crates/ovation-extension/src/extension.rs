//! The extension interface.
//!
//! An extension is an explicit trait object with init/destroy hooks,
//! instantiated with an injected [`Capabilities`] facade — never through
//! ambient global state. The manifest's `entry` field names a factory
//! registered with the host; the factory constructs the instance, the host
//! drives its lifecycle.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ovation_core::BoxError;

use crate::capability::Capabilities;
use crate::manifest::ExtensionManifest;

/// A dynamically loaded unit of behavior.
///
/// `init` is the only place an extension may register routes, event
/// handlers, channels, and registry contributions — all through the
/// injected capability facade. Returning `Err` moves the instance to the
/// error state without affecting any other extension.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Initialization hook, called once after construction.
    async fn init(&self, caps: Arc<Capabilities>) -> Result<(), BoxError>;

    /// Teardown hook, called on unload. Best-effort; default is a no-op.
    async fn teardown(&self) {}
}

/// Constructs an extension instance from its manifest.
///
/// Registered with the host under the manifest `entry` name. A factory
/// returning `Err` is a load failure for that extension only.
pub type ExtensionFactory =
    Arc<dyn Fn(&ExtensionManifest) -> Result<Box<dyn Extension>, BoxError> + Send + Sync>;

/// Lifecycle state of a registered extension.
///
/// Owned exclusively by the host; transitions happen only through host
/// operations:
///
/// ```text
/// discover() ─▶ Discovered ──load()──▶ Loading ──▶ Active
///                   ▲                     │           │
///                   │                     ▼           ▼
///                   └──────unload()── Unloading    Error
///                                         │
///              disable() ─────────────▶ Disabled ──enable()──▶ Loading …
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionState {
    /// Manifest found and valid; not yet loaded.
    Discovered,
    /// Between factory construction and a settled init hook.
    Loading,
    /// Initialized and participating in dispatch.
    Active,
    /// Construction or initialization failed; see the recorded cause.
    Error,
    /// Explicitly disabled by the operator; persisted across restarts.
    Disabled,
    /// Teardown in progress.
    Unloading,
}

impl ExtensionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionState::Discovered => "discovered",
            ExtensionState::Loading => "loading",
            ExtensionState::Active => "active",
            ExtensionState::Error => "error",
            ExtensionState::Disabled => "disabled",
            ExtensionState::Unloading => "unloading",
        }
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
