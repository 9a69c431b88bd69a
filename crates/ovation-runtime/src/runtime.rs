//! Runtime orchestration.
//!
//! [`OvationRuntime`] wires every component together: settings store, event
//! bus, registries, flow engine, timer service, extension host, route
//! table, channel hub, and the management server. Events flow through a
//! single cooperative dispatch loop:
//!
//! ```text
//! EventSource ─▶ EventSink ─▶ dispatch loop ─▶ EventBus
//!                                                ├─ core handlers
//!                                                ├─ extension handlers
//!                                                └─ FlowEngine
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ovation_runtime::OvationRuntime;
//!
//! let runtime = OvationRuntime::new()?;
//! runtime.register_factory("greeter", greeter_factory());
//! runtime.register_source(Arc::new(MyPlatformSource::new())).await;
//! runtime.run().await?;
//! ```

use std::fs;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ovation_core::{
    EventBus, EventHandler, EventSink, EventSource, LiveEvent, SettingsStore, handler_fn,
};
use ovation_extension::{
    ChannelHub, ExtensionFactory, ExtensionHost, ExtensionState, HostConfig, HostServices,
    RouteTable,
};
use ovation_flow::{FlowEngine, Registries, TimerService, VariableStore, builtin};
use ovation_server::AppState;

use crate::config::{ConfigLoader, OvationConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The main Ovation runtime.
pub struct OvationRuntime {
    config: OvationConfig,
    services: HostServices,
    host: Arc<ExtensionHost>,
    engine: Arc<FlowEngine>,
    timers: Arc<TimerService>,
    hub: Arc<ChannelHub>,
    routes: Arc<RouteTable>,
    sink: EventSink,
    /// Consumed by the dispatch loop on `start`.
    event_rx: Mutex<Option<tokio::sync::mpsc::Receiver<LiveEvent>>>,
    sources: RwLock<Vec<Arc<dyn EventSource>>>,
    shutdown: CancellationToken,
}

impl OvationRuntime {
    /// Creates a runtime with automatic configuration loading
    /// (`ovation.toml` in the search paths, `OVATION_*` env overrides).
    pub fn new() -> RuntimeResult<Self> {
        let config = ConfigLoader::new().load()?;
        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already-loaded configuration.
    pub fn from_config(config: &OvationConfig) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        fs::create_dir_all(&config.extensions.data_dir)?;
        let settings = Arc::new(SettingsStore::open(
            config.extensions.data_dir.join("settings.json"),
        )?);

        let registries = Arc::new(Registries::new());
        builtin::install(&registries);

        let variables = Arc::new(VariableStore::new());
        let engine = Arc::new(FlowEngine::with_persistence(
            Arc::clone(&registries),
            Arc::clone(&variables),
            config.automation.history_limit,
            Arc::clone(&settings),
        )?);

        let hub = Arc::new(ChannelHub::new());
        engine.set_broadcaster(Arc::clone(&hub) as Arc<dyn ovation_flow::Broadcaster>);

        let routes = Arc::new(RouteTable::new());
        let bus = Arc::new(EventBus::new());

        // Core handlers run before any extension subscriber, in this fixed
        // order: session-state bookkeeping first.
        bus.register_core(session_tracker(Arc::clone(&variables)));
        bus.set_sink(Arc::clone(&engine) as Arc<dyn EventHandler>);

        let services = HostServices {
            bus,
            routes: Arc::clone(&routes),
            channels: Arc::clone(&hub),
            settings,
            registries,
        };

        let host = Arc::new(ExtensionHost::new(
            HostConfig {
                extensions_dir: config.extensions.dir.clone(),
                data_dir: config.extensions.data_dir.clone(),
                base_url: config.server.base_url(),
                max_reloads: config.extensions.max_reloads,
                log_capacity: config.extensions.log_capacity,
            },
            services.clone(),
        )?);

        let timers = Arc::new(TimerService::new(Arc::clone(&engine)));
        let (sink, event_rx) = EventSink::channel(config.events.queue_capacity);

        info!(
            server = %config.server.addr(),
            extensions_dir = %config.extensions.dir.display(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config: config.clone(),
            services,
            host,
            engine,
            timers,
            hub,
            routes,
            sink,
            event_rx: Mutex::new(Some(event_rx)),
            sources: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &OvationConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<FlowEngine> {
        &self.engine
    }

    pub fn host(&self) -> &Arc<ExtensionHost> {
        &self.host
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    /// Sink for pushing events programmatically (tests, injection).
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Registers an extension factory under the name manifests reference.
    pub fn register_factory(&self, entry: &str, factory: ExtensionFactory) {
        self.host.register_factory(entry, factory);
    }

    /// Registers a live-event source. Sources start on [`run`](Self::run).
    pub async fn register_source(&self, source: Arc<dyn EventSource>) {
        self.sources.write().await.push(source);
    }

    /// Starts everything: extension discovery and loading, the dispatch
    /// loop, timers, sources, and the management server.
    pub async fn start(&self) -> RuntimeResult<()> {
        let event_rx = self
            .event_rx
            .lock()
            .await
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;

        if self.config.extensions.auto_load {
            let discovered = self.host.discover().await?;
            info!(discovered, "Extension discovery complete");
            self.host.load_all().await;
        }

        self.timers.sync();

        let bus = Arc::clone(&self.services.bus);
        tokio::spawn(async move {
            bus.drive(event_rx).await;
        });

        let sources = self.sources.read().await.clone();
        for source in sources {
            let sink = self.sink.clone();
            let token = self.shutdown.child_token();
            let name = source.name().to_string();
            info!(source = %name, "Event source started");
            tokio::spawn(async move {
                if let Err(e) = source.run(sink, token).await {
                    error!(source = %name, error = %e, "Event source terminated");
                }
            });
        }

        let state = AppState {
            host: Arc::clone(&self.host),
            engine: Arc::clone(&self.engine),
            timers: Arc::clone(&self.timers),
            hub: Arc::clone(&self.hub),
            routes: Arc::clone(&self.routes),
            sink: self.sink.clone(),
        };
        let addr = self.config.server.addr();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = ovation_server::serve(&addr, state, token).await {
                error!(error = %e, "Management server failed");
            }
        });

        info!("Runtime started");
        Ok(())
    }

    /// Stops sources, timers, and extensions, in that order.
    pub async fn stop(&self) {
        info!("Stopping runtime");
        self.shutdown.cancel();
        self.timers.shutdown();

        for info in self.host.list().await {
            if info.state == ExtensionState::Active
                && let Err(e) = self.host.unload(&info.id).await
            {
                warn!(extension = %info.id, error = %e, "Unload during shutdown failed");
            }
        }
        info!("Runtime stopped");
    }

    /// Runs until Ctrl-C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Ovation is running. Press Ctrl+C to stop.");
        self.wait_for_shutdown().await;
        self.stop().await;
        Ok(())
    }

    /// Runs until the given future completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }

    async fn wait_for_shutdown(&self) {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM handler");

            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
                _ = self.shutdown.cancelled() => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
                _ = self.shutdown.cancelled() => {}
            }
        }
    }
}

/// Core bus handler that mirrors session state into the variable store, so
/// flows can condition on `viewers` or `connected` without an extension.
fn session_tracker(variables: Arc<VariableStore>) -> Arc<dyn EventHandler> {
    handler_fn(move |event| {
        let variables = Arc::clone(&variables);
        async move {
            match &*event {
                LiveEvent::ViewerCount(e) => {
                    variables.set("viewers", serde_json::json!(e.viewers));
                }
                LiveEvent::Connected(_) => {
                    variables.set("connected", serde_json::json!(true));
                }
                LiveEvent::Disconnected(_) => {
                    variables.set("connected", serde_json::json!(false));
                }
                LiveEvent::Like(e) => {
                    if let Some(total) = e.total {
                        variables.set("session_likes", serde_json::json!(total));
                    }
                }
                _ => {}
            }
            Ok(())
        }
    })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating an [`OvationRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = OvationRuntime::builder()
///     .config_file("config/ovation.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Disables `OVATION_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges programmatic overrides at the highest priority.
    pub fn merge(mut self, config: OvationConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> RuntimeResult<OvationRuntime> {
        let config = self.loader.load()?;
        OvationRuntime::from_config(&config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ovation_core::{Actor, GiftEvent, ScriptedSource};
    use ovation_flow::{ActionSpec, ConditionLeaf, ConditionNode, ErrorPolicy, FlowDraft};
    use serde_json::json;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> OvationConfig {
        let mut config = OvationConfig::default();
        config.server.port = 0; // ephemeral
        config.extensions.dir = dir.join("extensions");
        config.extensions.data_dir = dir.join("data");
        config
    }

    fn gift(coins: u64) -> LiveEvent {
        LiveEvent::Gift(GiftEvent {
            actor: Actor {
                user_id: "u1".into(),
                username: "bob".into(),
            },
            gift_name: "rose".into(),
            coins,
            repeat_count: 1,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn events_flow_from_source_to_engine() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = OvationRuntime::from_config(&test_config(dir.path())).unwrap();

        runtime
            .engine()
            .create_flow(FlowDraft {
                name: "big gifts".into(),
                trigger: "gift".into(),
                trigger_params: serde_json::Value::Null,
                condition: Some(ConditionNode::Leaf(ConditionLeaf {
                    field: "coins".into(),
                    operator: "gte".into(),
                    value: json!(100),
                })),
                actions: vec![ActionSpec {
                    action: "set_variable".into(),
                    params: json!({"name": "best", "value": "{username}"}),
                }],
                enabled: true,
                on_error: ErrorPolicy::Abort,
            })
            .unwrap();

        runtime
            .register_source(Arc::new(ScriptedSource::new(vec![gift(50), gift(150)])))
            .await;
        runtime.start().await.unwrap();

        // Wait for the dispatch loop to process both events.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while runtime.engine().history().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(runtime.engine().history().len(), 1);
        assert_eq!(
            runtime.engine().variables().get("best"),
            Some(json!("bob"))
        );
        runtime.stop().await;
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = OvationRuntime::from_config(&test_config(dir.path())).unwrap();
        runtime.start().await.unwrap();
        assert!(matches!(
            runtime.start().await,
            Err(RuntimeError::AlreadyStarted)
        ));
        runtime.stop().await;
    }

    #[tokio::test]
    async fn session_tracker_mirrors_viewer_count() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = OvationRuntime::from_config(&test_config(dir.path())).unwrap();
        runtime.start().await.unwrap();

        runtime
            .sink()
            .send(LiveEvent::ViewerCount(ovation_core::ViewerCountEvent {
                viewers: 321,
                timestamp: Utc::now(),
            }))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while runtime.engine().variables().get("viewers").is_none()
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            runtime.engine().variables().get("viewers"),
            Some(json!(321))
        );
        runtime.stop().await;
    }
}
