//! Namespaced settings store.
//!
//! Key→JSON persistence with synchronous get/set and last-write-wins
//! semantics per key. Configuration changes are infrequent and
//! operator-driven, so no locking beyond the in-memory map and no
//! transactions are modeled.
//!
//! Extensions read and write under a namespace derived from their id
//! (`ext:<id>`); core features use their own namespaces. A value that
//! cannot be deserialized into the requested type surfaces as
//! [`SettingsError::Corrupt`] rather than a silent empty default.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Errors from the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the backing file failed.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not valid JSON.
    #[error("settings file is corrupt: {0}")]
    CorruptFile(#[source] serde_json::Error),

    /// A stored value does not deserialize into the requested type.
    #[error("corrupt value at {namespace}.{key}: {source}")]
    Corrupt {
        namespace: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

type Namespaces = HashMap<String, Map<String, Value>>;

/// File-backed, namespaced key→JSON store.
///
/// Writes flush the whole map to a temp file then rename it over the
/// target, so the file on disk is always a complete JSON document.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<Namespaces>,
}

impl SettingsStore {
    /// Opens (or creates) a store backed by `path`.
    ///
    /// A missing file starts empty; an unreadable or non-JSON file is an
    /// error, never silently discarded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Namespaces::default()
            } else {
                serde_json::from_str(&raw).map_err(SettingsError::CorruptFile)?
            }
        } else {
            Namespaces::default()
        };
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Creates a store with no backing file. Used in tests and demos.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(Namespaces::default()),
        }
    }

    /// Returns the raw value at `namespace.key`, if present.
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.data
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
    }

    /// Returns the value at `namespace.key` deserialized into `T`.
    ///
    /// `Ok(None)` when absent; [`SettingsError::Corrupt`] when present but
    /// not deserializable into `T`.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, SettingsError> {
        match self.get(namespace, key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| SettingsError::Corrupt {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Stores `value` at `namespace.key` and flushes. Last write wins.
    pub fn set(&self, namespace: &str, key: &str, value: Value) -> Result<(), SettingsError> {
        {
            let mut data = self.data.write();
            data.entry(namespace.to_string())
                .or_default()
                .insert(key.to_string(), value);
        }
        self.flush()
    }

    /// Removes `namespace.key` if present and flushes.
    pub fn remove(&self, namespace: &str, key: &str) -> Result<(), SettingsError> {
        let removed = {
            let mut data = self.data.write();
            data.get_mut(namespace)
                .and_then(|ns| ns.remove(key))
                .is_some()
        };
        if removed { self.flush() } else { Ok(()) }
    }

    /// Returns every key under `namespace`.
    pub fn keys(&self, namespace: &str) -> Vec<String> {
        self.data
            .read()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn flush(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data).map_err(SettingsError::CorruptFile)?
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Settings flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_round_trip() {
        let store = SettingsStore::in_memory();
        store.set("ext:greeter", "volume", json!(7)).unwrap();
        assert_eq!(store.get("ext:greeter", "volume"), Some(json!(7)));
        assert_eq!(store.get("ext:other", "volume"), None);
    }

    #[test]
    fn last_write_wins() {
        let store = SettingsStore::in_memory();
        store.set("ns", "k", json!("first")).unwrap();
        store.set("ns", "k", json!("second")).unwrap();
        assert_eq!(store.get("ns", "k"), Some(json!("second")));
    }

    #[test]
    fn wrong_type_surfaces_as_corrupt() {
        let store = SettingsStore::in_memory();
        store.set("ns", "k", json!("not a number")).unwrap();
        let err = store.get_as::<u64>("ns", "k").unwrap_err();
        assert!(matches!(err, SettingsError::Corrupt { .. }));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::open(&path).unwrap();
        store.set("ns", "k", json!({"a": 1})).unwrap();
        drop(store);

        let store = SettingsStore::open(&path).unwrap();
        assert_eq!(store.get("ns", "k"), Some(json!({"a": 1})));
    }

    #[test]
    fn corrupt_file_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SettingsStore::open(&path).unwrap_err();
        assert!(matches!(err, SettingsError::CorruptFile(_)));
    }
}
