//! Capability API.
//!
//! [`Capabilities`] is the only interface through which an extension may
//! affect the host. Each instance is scoped to one extension: every
//! registration it performs is attributed to that extension's id, and every
//! operation is gated by the [`CapabilityGrant`] derived from the manifest's
//! declared permissions at load time.
//!
//! Logging and the directory/URL helpers are always granted; everything
//! else requires the matching [`Permission`].

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use ovation_core::{EventBus, EventHandler, EventKind, SettingsError, SettingsStore};
use ovation_flow::{ActionDef, OperatorDef, Registries, TriggerDef};

use crate::channels::{ChannelHandler, ChannelHub};
use crate::routes::{RouteHandler, RouteTable};

// ============================================================================
// Permissions
// ============================================================================

/// Capability permissions an extension may declare in its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Register HTTP routes under the extension's prefix.
    Routes,
    /// Subscribe to live events on the bus.
    Events,
    /// Register channel handlers.
    Channels,
    /// Read and write namespaced configuration.
    Config,
    /// Push payloads to all connected channel clients.
    Broadcast,
    /// Contribute trigger/operator/action definitions to the registries.
    Automation,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Routes => "routes",
            Permission::Events => "events",
            Permission::Channels => "channels",
            Permission::Config => "config",
            Permission::Broadcast => "broadcast",
            Permission::Automation => "automation",
        }
    }
}

/// The subset of capability operations an extension may invoke, derived
/// from its declared permissions at load time.
#[derive(Debug, Clone, Default)]
pub struct CapabilityGrant {
    permissions: HashSet<Permission>,
}

impl CapabilityGrant {
    pub fn new(permissions: &[Permission]) -> Self {
        Self {
            permissions: permissions.iter().copied().collect(),
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Errors from capability operations.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The extension did not declare the permission this operation needs.
    #[error("extension '{extension}' lacks the '{permission}' permission")]
    PermissionDenied {
        extension: String,
        permission: &'static str,
    },

    /// Configuration access failed (including corrupt stored values).
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

// ============================================================================
// Per-extension log buffer
// ============================================================================

/// One entry in an extension's log ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// Bounded ring of an extension's log lines, served by the management API.
pub struct LogBuffer {
    capacity: usize,
    entries: RwLock<VecDeque<LogEntry>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn push(&self, level: &str, message: &str) {
        let mut entries = self.entries.write();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.to_string(),
        });
    }

    /// Most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

// ============================================================================
// Capabilities facade
// ============================================================================

/// Shared host services the facade fronts.
#[derive(Clone)]
pub struct HostServices {
    pub bus: Arc<EventBus>,
    pub routes: Arc<RouteTable>,
    pub channels: Arc<ChannelHub>,
    pub settings: Arc<SettingsStore>,
    pub registries: Arc<Registries>,
}

/// Per-extension capability facade.
pub struct Capabilities {
    extension_id: String,
    grant: CapabilityGrant,
    services: HostServices,
    logs: Arc<LogBuffer>,
    data_dir: PathBuf,
    base_url: String,
}

impl Capabilities {
    pub(crate) fn new(
        extension_id: String,
        grant: CapabilityGrant,
        services: HostServices,
        logs: Arc<LogBuffer>,
        data_dir: PathBuf,
        base_url: String,
    ) -> Self {
        Self {
            extension_id,
            grant,
            services,
            logs,
            data_dir,
            base_url,
        }
    }

    fn require(&self, permission: Permission) -> Result<(), CapabilityError> {
        if self.grant.allows(permission) {
            Ok(())
        } else {
            Err(CapabilityError::PermissionDenied {
                extension: self.extension_id.clone(),
                permission: permission.as_str(),
            })
        }
    }

    /// The id this facade is scoped to.
    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    /// Registers an HTTP route, served under `/ext/<id>/<path>`.
    pub fn register_route(
        &self,
        method: &str,
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<(), CapabilityError> {
        self.require(Permission::Routes)?;
        let scoped = format!("/{}/{}", self.extension_id, path.trim_start_matches('/'));
        self.services
            .routes
            .register(&self.extension_id, method, &scoped, handler);
        Ok(())
    }

    /// Subscribes a handler to one event kind on the bus. Handler errors
    /// are caught per dispatch and logged with this extension's id.
    pub fn register_event(
        &self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), CapabilityError> {
        self.require(Permission::Events)?;
        self.services.bus.subscribe(&self.extension_id, kind, handler);
        Ok(())
    }

    /// Registers a channel handler under `<id>:<name>`.
    pub fn register_channel(
        &self,
        name: &str,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<(), CapabilityError> {
        self.require(Permission::Channels)?;
        self.services
            .channels
            .register(&self.extension_id, name, handler);
        Ok(())
    }

    /// Contributes a trigger definition to the automation registry.
    pub fn register_trigger(&self, def: TriggerDef) -> Result<(), CapabilityError> {
        self.require(Permission::Automation)?;
        let tag = def.tag.clone();
        self.services.registries.triggers.register(&tag, def);
        Ok(())
    }

    /// Contributes a condition-operator definition.
    pub fn register_operator(&self, def: OperatorDef) -> Result<(), CapabilityError> {
        self.require(Permission::Automation)?;
        let tag = def.tag.clone();
        self.services.registries.operators.register(&tag, def);
        Ok(())
    }

    /// Contributes an action definition.
    pub fn register_action(&self, def: ActionDef) -> Result<(), CapabilityError> {
        self.require(Permission::Automation)?;
        let tag = def.tag.clone();
        self.services.registries.actions.register(&tag, def);
        Ok(())
    }

    /// Reads a config value from this extension's settings namespace.
    ///
    /// A stored value that cannot be interpreted surfaces as a typed
    /// [`SettingsError::Corrupt`] — never a silent empty object.
    pub fn get_config(&self, key: &str) -> Result<Option<Value>, CapabilityError> {
        self.require(Permission::Config)?;
        Ok(self.services.settings.get(&self.namespace(), key))
    }

    /// Reads a config value deserialized into `T`.
    pub fn get_config_as<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CapabilityError> {
        self.require(Permission::Config)?;
        Ok(self.services.settings.get_as(&self.namespace(), key)?)
    }

    /// Writes a config value. Last write wins.
    pub fn set_config(&self, key: &str, value: Value) -> Result<(), CapabilityError> {
        self.require(Permission::Config)?;
        Ok(self.services.settings.set(&self.namespace(), key, value)?)
    }

    /// Pushes `<id>:<event_name>` to every connected channel client.
    pub fn broadcast(&self, event_name: &str, payload: Value) -> Result<(), CapabilityError> {
        self.require(Permission::Broadcast)?;
        let channel = format!("{}:{}", self.extension_id, event_name);
        self.services.channels.broadcast(&channel, payload);
        Ok(())
    }

    /// Logs a message attributed to this extension. Always granted; also
    /// recorded in the extension's log ring for the management API.
    pub fn log(&self, level: &str, message: &str) {
        match level {
            "trace" => trace!(extension = %self.extension_id, "{message}"),
            "debug" => debug!(extension = %self.extension_id, "{message}"),
            "warn" => warn!(extension = %self.extension_id, "{message}"),
            "error" => error!(extension = %self.extension_id, "{message}"),
            _ => info!(extension = %self.extension_id, "{message}"),
        }
        self.logs.push(level, message);
    }

    /// This extension's private data directory, created at load time.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Public base URL under which this extension's routes are served.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn namespace(&self) -> String {
        format!("ext:{}", self.extension_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn services() -> HostServices {
        HostServices {
            bus: Arc::new(EventBus::new()),
            routes: Arc::new(RouteTable::new()),
            channels: Arc::new(ChannelHub::new()),
            settings: Arc::new(SettingsStore::in_memory()),
            registries: Arc::new(Registries::new()),
        }
    }

    fn caps(permissions: &[Permission]) -> Capabilities {
        Capabilities::new(
            "greeter".into(),
            CapabilityGrant::new(permissions),
            services(),
            Arc::new(LogBuffer::new(16)),
            PathBuf::from("/tmp/greeter"),
            "http://127.0.0.1:8090/ext/greeter".into(),
        )
    }

    #[test]
    fn ungranted_operation_is_denied() {
        let caps = caps(&[Permission::Events]);
        let err = caps.set_config("k", json!(1)).unwrap_err();
        assert!(matches!(err, CapabilityError::PermissionDenied { .. }));
    }

    #[test]
    fn config_is_namespaced_by_extension_id() {
        let caps = caps(&[Permission::Config]);
        caps.set_config("volume", json!(3)).unwrap();
        assert_eq!(caps.get_config("volume").unwrap(), Some(json!(3)));
        assert_eq!(
            caps.services.settings.get("ext:greeter", "volume"),
            Some(json!(3))
        );
    }

    #[test]
    fn corrupt_config_is_a_typed_error() {
        let caps = caps(&[Permission::Config]);
        caps.set_config("volume", json!("loud")).unwrap();
        let err = caps.get_config_as::<u32>("volume").unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::Settings(SettingsError::Corrupt { .. })
        ));
    }

    #[test]
    fn routes_are_scoped_under_the_extension_id() {
        use crate::routes::RouteRequest;
        use async_trait::async_trait;
        use ovation_core::BoxError;

        struct Ok200;
        #[async_trait]
        impl RouteHandler for Ok200 {
            async fn handle(&self, _request: RouteRequest) -> Result<Value, BoxError> {
                Ok(json!("ok"))
            }
        }

        let caps = caps(&[Permission::Routes]);
        caps.register_route("GET", "status", Arc::new(Ok200)).unwrap();

        let routes = caps.services.routes.list();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/greeter/status");
        assert_eq!(routes[0].extension, "greeter");
    }

    #[test]
    fn log_is_always_granted_and_buffered() {
        let caps = caps(&[]);
        caps.log("info", "hello");
        caps.log("error", "bad");
        let recent = caps.logs.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].level, "error");
    }
}
