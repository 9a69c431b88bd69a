//! # Ovation
//!
//! A live-event companion: ingests typed events from a streaming platform
//! and fans them out to user-configurable behavior — capability-scoped
//! extensions and trigger/condition/action automation flows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────┐     ┌─────────────────────────────┐
//! │ Event Source │────▶│ EventBus │────▶│ core handlers               │
//! │  (platform)  │     │          │────▶│ extension handlers (isolated)│
//! └──────────────┘     └──────────┘────▶│ FlowEngine (flows → actions)│
//!                                       └─────────────────────────────┘
//!        Extensions ──▶ Capabilities ──▶ routes / channels / registries
//! ```
//!
//! - **Runtime**: wires configuration, the event pipeline, and the server
//! - **Extensions**: manifest-driven units behind a capability grant; a
//!   failing extension never takes the host down
//! - **Flows**: user-defined automation evaluated in registration order
//! - **Registries**: built-in plus extension-contributed trigger, operator,
//!   and action definitions, resolved identically
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ovation::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = OvationRuntime::new()?;
//!     runtime.register_factory("greeter", greeter_factory());
//!     runtime.register_source(Arc::new(MySource::new())).await;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub use ovation_core as core;
pub use ovation_extension as extension;
pub use ovation_flow as flow;
pub use ovation_runtime as runtime;
pub use ovation_server as server;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use ovation_runtime::{OvationRuntime, RuntimeBuilder};

    // Event model and bus
    pub use ovation_core::{
        EventBus, EventHandler, EventKind, EventSink, EventSource, LiveEvent, ScriptedSource,
        handler_fn,
    };

    // Extension surface
    pub use ovation_extension::{
        Capabilities, ChannelHandler, Extension, ExtensionManifest, ExtensionState, Permission,
        RouteHandler, RouteRequest,
    };

    // Automation surface
    pub use ovation_flow::{
        ActionContext, ActionDef, ActionExecutor, ConditionNode, Flow, FlowDraft, OperatorDef,
        TriggerDef,
    };

    // Error types callers typically handle
    pub use ovation_core::BoxError;
    pub use ovation_runtime::RuntimeError;
}
