//! Extension host.
//!
//! [`ExtensionHost`] owns every extension instance and is the only place
//! lifecycle state changes. Loading is isolated per extension: a malformed
//! manifest, a failing constructor, or a failing init hook marks that one
//! extension as errored and never prevents others from loading.
//!
//! ## Resource reclamation on unload
//!
//! Routes, bus subscriptions, and channel handlers are attributed to the
//! owning extension id and revoked deterministically on unload. Registry
//! contributions (triggers, operators, actions) are the exception: the
//! definitions capture the extension instance and remain until a later
//! load overwrites the same tag. The host counts reloads per extension and
//! warns past the configured threshold that a process restart is the clean
//! way to reclaim them.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future;
use serde::Serialize;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{error, info, warn};

use crate::capability::{Capabilities, CapabilityGrant, HostServices, LogBuffer, LogEntry, Permission};
use crate::error::{ExtensionError, ExtensionResult};
use crate::extension::{Extension, ExtensionFactory, ExtensionState};
use crate::installer::Installer;
use crate::manifest::ExtensionManifest;
use crate::state::StateFile;

// =============================================================================
// Topological layering
// =============================================================================

/// Computes the extension load order as **layers** via Kahn's algorithm.
///
/// Each inner vec holds indices of extensions with no dependencies on one
/// another; unload order is the reverse of the layers. An edge A → B means
/// "A must be active before B loads".
///
/// Dependencies on unknown ids are logged and ignored for ordering — the
/// per-extension dependency check at load time fails them properly.
/// Returns `Err` when a dependency cycle is detected.
fn topological_layers(entries: &[(String, Vec<String>)]) -> Result<Vec<Vec<usize>>, String> {
    let n = entries.len();
    let index: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![vec![]; n];

    for (i, (id, deps)) in entries.iter().enumerate() {
        for dep in deps {
            match index.get(dep.as_str()) {
                Some(&provider) if provider != i => {
                    dependents[provider].push(i);
                    in_degree[i] += 1;
                }
                Some(_) => {}
                None => {
                    warn!(
                        extension = %id,
                        dependency = %dep,
                        "Dependency is not a registered extension; load order not guaranteed"
                    );
                }
            }
        }
    }

    let mut layers: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut processed = 0;

    while !current.is_empty() {
        processed += current.len();
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    next.push(j);
                }
            }
        }
        layers.push(current);
        current = next;
    }

    if processed != n {
        let cycle: Vec<&str> = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| entries[i].0.as_str())
            .collect();
        return Err(format!(
            "extension dependency cycle detected among: {}",
            cycle.join(", ")
        ));
    }
    Ok(layers)
}

// =============================================================================
// Host
// =============================================================================

/// Host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory scanned for `*/manifest.json`.
    pub extensions_dir: PathBuf,
    /// Parent of per-extension data directories and the state file.
    pub data_dir: PathBuf,
    /// Public base URL, used for the capability URL helper.
    pub base_url: String,
    /// Reload count past which the host recommends a restart.
    pub max_reloads: u32,
    /// Per-extension log ring capacity.
    pub log_capacity: usize,
}

struct ExtensionEntry {
    manifest: ExtensionManifest,
    state: ExtensionState,
    instance: Option<Arc<dyn Extension>>,
    logs: Arc<LogBuffer>,
    error: Option<String>,
}

/// Serializable view of one extension, for the management API.
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub state: ExtensionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enabled: bool,
    pub reload_count: u32,
    pub permissions: Vec<Permission>,
    pub dependencies: Vec<String>,
}

/// Central owner of extension lifecycle.
pub struct ExtensionHost {
    config: HostConfig,
    services: HostServices,
    installer: Installer,
    factories: parking_lot::RwLock<HashMap<String, ExtensionFactory>>,
    entries: AsyncRwLock<Vec<ExtensionEntry>>,
    state_file: StateFile,
}

impl ExtensionHost {
    /// Creates a host. Fails only when the persisted state file exists but
    /// cannot be parsed.
    pub fn new(config: HostConfig, services: HostServices) -> ExtensionResult<Self> {
        let state_file = StateFile::load(config.data_dir.join("extensions-state.json"))?;
        let installer = Installer::new(config.extensions_dir.clone());
        Ok(Self {
            config,
            services,
            installer,
            factories: parking_lot::RwLock::new(HashMap::new()),
            entries: AsyncRwLock::new(Vec::new()),
            state_file,
        })
    }

    /// Registers a factory under the name manifests reference via `entry`.
    pub fn register_factory(&self, entry: &str, factory: ExtensionFactory) {
        self.factories.write().insert(entry.to_string(), factory);
    }

    // ─── Discovery & registration ────────────────────────────────────────

    /// Registers a validated manifest. Rejects duplicate ids: the first
    /// registration stays.
    pub async fn register_manifest(&self, manifest: ExtensionManifest) -> ExtensionResult<()> {
        manifest.validate()?;
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.manifest.id == manifest.id) {
            return Err(ExtensionError::DuplicateId(manifest.id));
        }

        // The persisted enabled flag wins over the manifest default.
        let enabled = if self.state_file.contains(&manifest.id) {
            self.state_file.get(&manifest.id).enabled
        } else {
            manifest.enabled
        };
        let state = if enabled {
            ExtensionState::Discovered
        } else {
            ExtensionState::Disabled
        };

        info!(extension = %manifest.id, state = %state, "Extension registered");
        entries.push(ExtensionEntry {
            manifest,
            state,
            instance: None,
            logs: Arc::new(LogBuffer::new(self.config.log_capacity)),
            error: None,
        });
        Ok(())
    }

    /// Scans the extensions directory for manifests. Malformed manifests
    /// and duplicate ids are skipped and logged; they never abort the scan.
    /// Returns how many extensions were newly registered.
    pub async fn discover(&self) -> ExtensionResult<usize> {
        fs::create_dir_all(&self.config.extensions_dir)?;

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.config.extensions_dir)?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| {
                // Skip abandoned staging directories.
                !p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
            })
            .collect();
        dirs.sort();

        let mut added = 0;
        for dir in dirs {
            let manifest = match ExtensionManifest::load(&dir) {
                Ok(m) => m,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping extension with invalid manifest");
                    continue;
                }
            };
            match self.register_manifest(manifest).await {
                Ok(()) => added += 1,
                Err(ExtensionError::DuplicateId(id)) => {
                    warn!(extension = %id, dir = %dir.display(), "Duplicate extension id, keeping the first");
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping extension");
                }
            }
        }
        Ok(added)
    }

    /// Unpacks, validates, and registers an uploaded package. Validation
    /// happens entirely in a staging area: a rejected upload leaves no
    /// partial extension directory. The new extension is registered but not
    /// loaded; enable it to activate.
    pub async fn install(&self, bytes: Vec<u8>) -> ExtensionResult<ExtensionInfo> {
        let staged = {
            let installer = Installer::new(self.config.extensions_dir.clone());
            tokio::task::spawn_blocking(move || installer.stage(&bytes))
                .await
                .map_err(|e| ExtensionError::Upload(format!("staging task failed: {e}")))??
        };

        // The id must also be unknown to the registry (an entry can exist
        // without a directory mid-delete).
        let collision = {
            let entries = self.entries.read().await;
            entries.iter().any(|e| e.manifest.id == staged.manifest.id)
        };
        if collision {
            let id = staged.manifest.id.clone();
            self.installer.discard(&staged);
            return Err(ExtensionError::DuplicateId(id));
        }

        let manifest = self.installer.commit(staged)?;
        let id = manifest.id.clone();
        self.register_manifest(manifest).await?;
        self.get(&id)
            .await
            .ok_or_else(|| ExtensionError::NotFound(id))
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Loads one extension: dependency check, factory construction,
    /// capability injection, init hook. Any failure moves this extension —
    /// and only this extension — to the error state.
    pub async fn load(&self, id: &str) -> ExtensionResult<()> {
        let (manifest, logs) = {
            let mut entries = self.entries.write().await;
            let entry = find_mut(&mut entries, id)?;
            match entry.state {
                ExtensionState::Discovered | ExtensionState::Disabled | ExtensionState::Error => {}
                state => {
                    return Err(ExtensionError::InvalidState {
                        id: id.to_string(),
                        state: state.as_str(),
                        expected: "discovered, disabled, or error",
                    });
                }
            }
            entry.state = ExtensionState::Loading;
            entry.error = None;
            (entry.manifest.clone(), Arc::clone(&entry.logs))
        };

        // Declared dependencies must already be active.
        {
            let entries = self.entries.read().await;
            let missing = manifest.dependencies.iter().find(|dep| {
                !entries
                    .iter()
                    .any(|e| &e.manifest.id == *dep && e.state == ExtensionState::Active)
            });
            if let Some(dep) = missing {
                let dep = dep.clone();
                drop(entries);
                self.fail(id, format!("dependency '{dep}' is not active")).await;
                return Err(ExtensionError::Dependency {
                    id: id.to_string(),
                    dependency: dep,
                });
            }
        }

        let factory = self.factories.read().get(&manifest.entry).cloned();
        let Some(factory) = factory else {
            self.fail(id, format!("no factory registered for entry '{}'", manifest.entry))
                .await;
            return Err(ExtensionError::UnknownEntry(manifest.entry));
        };

        let instance: Arc<dyn Extension> = match factory(&manifest) {
            Ok(boxed) => Arc::from(boxed),
            Err(e) => {
                self.fail(id, format!("constructor failed: {e}")).await;
                return Err(ExtensionError::Init {
                    id: id.to_string(),
                    source: e,
                });
            }
        };

        // Seed default config for keys the operator has not set yet.
        let namespace = manifest.config_namespace();
        for (key, value) in &manifest.config {
            if self.services.settings.get(&namespace, key).is_none()
                && let Err(e) = self.services.settings.set(&namespace, key, value.clone())
            {
                warn!(extension = %id, key, error = %e, "Failed to seed default config");
            }
        }

        let data_dir = self.config.data_dir.join(&manifest.id);
        fs::create_dir_all(&data_dir)?;
        let caps = Arc::new(Capabilities::new(
            manifest.id.clone(),
            CapabilityGrant::new(&manifest.permissions),
            self.services.clone(),
            logs,
            data_dir,
            format!("{}/ext/{}", self.config.base_url, manifest.id),
        ));

        if let Err(e) = instance.init(caps).await {
            // Revoke whatever a half-finished init managed to register.
            self.release_resources(id);
            self.fail(id, format!("init failed: {e}")).await;
            return Err(ExtensionError::Init {
                id: id.to_string(),
                source: e,
            });
        }

        {
            let mut entries = self.entries.write().await;
            let entry = find_mut(&mut entries, id)?;
            entry.state = ExtensionState::Active;
            entry.instance = Some(instance);
        }
        self.state_file.update(id, |e| {
            e.enabled = true;
            e.loaded_at = Some(Utc::now());
        })?;
        info!(extension = %id, "Extension loaded and active");
        Ok(())
    }

    /// Loads every loadable extension in dependency order. Extensions in
    /// the same layer load concurrently; failures are isolated and logged.
    pub async fn load_all(&self) {
        let layers = {
            let entries = self.entries.read().await;
            let graph: Vec<(String, Vec<String>)> = entries
                .iter()
                .map(|e| (e.manifest.id.clone(), e.manifest.dependencies.clone()))
                .collect();
            match topological_layers(&graph) {
                Ok(layers) => layers
                    .into_iter()
                    .map(|layer| {
                        layer
                            .into_iter()
                            .map(|i| graph[i].0.clone())
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>(),
                Err(e) => {
                    error!("{e}");
                    graph.iter().map(|(id, _)| vec![id.clone()]).collect()
                }
            }
        };

        for layer in layers {
            let loadable: Vec<String> = {
                let entries = self.entries.read().await;
                layer
                    .into_iter()
                    .filter(|id| {
                        entries
                            .iter()
                            .any(|e| &e.manifest.id == id && e.state == ExtensionState::Discovered)
                    })
                    .collect()
            };
            // Errors are already recorded per extension; isolation means we
            // simply keep going.
            let _ = future::join_all(loadable.iter().map(|id| self.load(id))).await;
        }
    }

    /// Unloads an active extension: teardown hook, then deterministic
    /// release of its routes, bus subscriptions, and channel handlers.
    pub async fn unload(&self, id: &str) -> ExtensionResult<()> {
        self.unload_to(id, ExtensionState::Discovered).await
    }

    async fn unload_to(&self, id: &str, target: ExtensionState) -> ExtensionResult<()> {
        let instance = {
            let mut entries = self.entries.write().await;
            let entry = find_mut(&mut entries, id)?;
            if entry.state != ExtensionState::Active {
                return Err(ExtensionError::InvalidState {
                    id: id.to_string(),
                    state: entry.state.as_str(),
                    expected: "active",
                });
            }
            entry.state = ExtensionState::Unloading;
            entry.instance.take()
        };

        if let Some(instance) = instance {
            instance.teardown().await;
        }
        self.release_resources(id);

        let mut entries = self.entries.write().await;
        let entry = find_mut(&mut entries, id)?;
        entry.state = target;
        info!(extension = %id, state = %target, "Extension unloaded");
        Ok(())
    }

    fn release_resources(&self, id: &str) {
        self.services.routes.remove_extension(id);
        self.services.channels.remove_extension(id);
        self.services.bus.unsubscribe_extension(id);
    }

    /// Unload + load. Counts against the reload budget: registry
    /// contributions from previous loads are only ever overwritten, never
    /// reclaimed, so past `max_reloads` the host recommends a restart.
    pub async fn reload(&self, id: &str) -> ExtensionResult<()> {
        if self.state_of(id).await == Some(ExtensionState::Active) {
            self.unload_to(id, ExtensionState::Discovered).await?;
        }
        self.state_file.update(id, |e| e.reload_count += 1)?;

        let count = self.state_file.get(id).reload_count;
        if count > self.config.max_reloads {
            warn!(
                extension = %id,
                reload_count = count,
                "Reload budget exceeded; registry contributions from old loads accumulate — \
                 restart the process to reclaim them"
            );
        }
        self.load(id).await
    }

    /// Reloads every active extension, one at a time.
    pub async fn reload_all(&self) {
        let active: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|e| e.state == ExtensionState::Active)
                .map(|e| e.manifest.id.clone())
                .collect()
        };
        for id in active {
            if let Err(e) = self.reload(&id).await {
                warn!(extension = %id, error = %e, "Reload failed");
            }
        }
    }

    /// Marks an extension enabled (persisted) and loads it.
    pub async fn enable(&self, id: &str) -> ExtensionResult<()> {
        self.state_file.update(id, |e| e.enabled = true)?;
        match self.state_of(id).await {
            Some(ExtensionState::Active) => Ok(()),
            Some(_) => self.load(id).await,
            None => Err(ExtensionError::NotFound(id.to_string())),
        }
    }

    /// Marks an extension disabled (persisted) and unloads it if active.
    pub async fn disable(&self, id: &str) -> ExtensionResult<()> {
        self.state_file.update(id, |e| e.enabled = false)?;
        match self.state_of(id).await {
            Some(ExtensionState::Active) => self.unload_to(id, ExtensionState::Disabled).await,
            Some(_) => {
                let mut entries = self.entries.write().await;
                let entry = find_mut(&mut entries, id)?;
                entry.state = ExtensionState::Disabled;
                Ok(())
            }
            None => Err(ExtensionError::NotFound(id.to_string())),
        }
    }

    /// Unloads (if needed), unregisters, and deletes an extension's
    /// directory and persisted state.
    pub async fn delete(&self, id: &str) -> ExtensionResult<()> {
        if self.state_of(id).await == Some(ExtensionState::Active) {
            self.unload_to(id, ExtensionState::Discovered).await?;
        }
        {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|e| e.manifest.id != id);
            if entries.len() == before {
                return Err(ExtensionError::NotFound(id.to_string()));
            }
        }
        self.state_file.forget(id)?;
        let dir = self.config.extensions_dir.join(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        info!(extension = %id, "Extension deleted");
        Ok(())
    }

    // ─── Introspection ───────────────────────────────────────────────────

    pub async fn state_of(&self, id: &str) -> Option<ExtensionState> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.manifest.id == id)
            .map(|e| e.state)
    }

    pub async fn list(&self) -> Vec<ExtensionInfo> {
        let entries = self.entries.read().await;
        entries.iter().map(|e| self.info(e)).collect()
    }

    pub async fn get(&self, id: &str) -> Option<ExtensionInfo> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|e| e.manifest.id == id)
            .map(|e| self.info(e))
    }

    /// Recent log entries for one extension, newest first.
    pub async fn logs(&self, id: &str, limit: usize) -> ExtensionResult<Vec<LogEntry>> {
        let entries = self.entries.read().await;
        let entry = entries
            .iter()
            .find(|e| e.manifest.id == id)
            .ok_or_else(|| ExtensionError::NotFound(id.to_string()))?;
        Ok(entry.logs.recent(limit))
    }

    fn info(&self, entry: &ExtensionEntry) -> ExtensionInfo {
        let persisted = self.state_file.get(&entry.manifest.id);
        let enabled = if self.state_file.contains(&entry.manifest.id) {
            persisted.enabled
        } else {
            entry.manifest.enabled
        };
        ExtensionInfo {
            id: entry.manifest.id.clone(),
            name: entry.manifest.name.clone(),
            version: entry.manifest.version.clone(),
            description: entry.manifest.description.clone(),
            state: entry.state,
            error: entry.error.clone(),
            enabled,
            reload_count: persisted.reload_count,
            permissions: entry.manifest.permissions.clone(),
            dependencies: entry.manifest.dependencies.clone(),
        }
    }

    async fn fail(&self, id: &str, cause: String) {
        error!(extension = %id, cause = %cause, "Extension failed to load");
        let mut entries = self.entries.write().await;
        if let Ok(entry) = find_mut(&mut entries, id) {
            entry.state = ExtensionState::Error;
            entry.error = Some(cause);
        }
    }
}

fn find_mut<'a>(
    entries: &'a mut [ExtensionEntry],
    id: &str,
) -> ExtensionResult<&'a mut ExtensionEntry> {
    entries
        .iter_mut()
        .find(|e| e.manifest.id == id)
        .ok_or_else(|| ExtensionError::NotFound(id.to_string()))
}
