//! Persisted extension state.
//!
//! A single JSON file maps extension id → `{enabled, loaded_at,
//! reload_count}` so enable/disable decisions and reload counters survive
//! restarts. Writes go through a temp-file rename, so the file is always a
//! complete document.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ExtensionError, ExtensionResult};

/// Persisted per-extension record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionStateEntry {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub loaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reload_count: u32,
}

/// The extension state file.
pub struct StateFile {
    path: PathBuf,
    entries: RwLock<HashMap<String, ExtensionStateEntry>>,
}

impl StateFile {
    /// Loads the state file, starting empty when it does not exist.
    pub fn load(path: PathBuf) -> ExtensionResult<Self> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw).map_err(ExtensionError::State)?
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Returns the record for `id`, defaulting when absent.
    pub fn get(&self, id: &str) -> ExtensionStateEntry {
        self.entries.read().get(id).cloned().unwrap_or_default()
    }

    /// Whether `id` has an explicit record.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Mutates the record for `id` and persists.
    pub fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut ExtensionStateEntry),
    ) -> ExtensionResult<()> {
        {
            let mut entries = self.entries.write();
            f(entries.entry(id.to_string()).or_default());
        }
        self.save()
    }

    /// Removes the record for `id` and persists.
    pub fn forget(&self, id: &str) -> ExtensionResult<()> {
        self.entries.write().remove(id);
        self.save()
    }

    fn save(&self) -> ExtensionResult<()> {
        let json = {
            let entries = self.entries.read();
            serde_json::to_string_pretty(&*entries).map_err(ExtensionError::State)?
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
