//! Shared application state for the management server.

use std::sync::Arc;

use ovation_core::EventSink;
use ovation_extension::{ChannelHub, ExtensionHost, RouteTable};
use ovation_flow::{FlowEngine, TimerService};

/// Handles every API layer needs. Cheap to clone; everything is shared.
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<ExtensionHost>,
    pub engine: Arc<FlowEngine>,
    pub timers: Arc<TimerService>,
    pub hub: Arc<ChannelHub>,
    pub routes: Arc<RouteTable>,
    /// Feeds manually injected events into the dispatch loop.
    pub sink: EventSink,
}
