//! Shared variable store.
//!
//! Variables are mutable key→value state visible to every flow: conditions
//! read them through the merged evaluation scope and templates resolve them
//! after event fields. Mutation goes exclusively through [`VariableStore`]
//! set/delete so every write carries a last-updated timestamp.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stored variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Shared mutable key→value state, visible to all flows.
#[derive(Default)]
pub struct VariableStore {
    vars: RwLock<HashMap<String, Variable>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, stamping the update time.
    pub fn set(&self, name: &str, value: Value) {
        self.vars.write().insert(
            name.to_string(),
            Variable {
                value,
                updated_at: Utc::now(),
            },
        );
    }

    /// Returns the current value of `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).map(|v| v.value.clone())
    }

    /// Removes `name`; returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        self.vars.write().remove(name).is_some()
    }

    /// All variables with their timestamps, for the introspection API.
    pub fn list(&self) -> HashMap<String, Variable> {
        self.vars.read().clone()
    }

    /// A plain name→value object for condition scopes and templates.
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .vars
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_delete() {
        let store = VariableStore::new();
        store.set("counter", json!(1));
        assert_eq!(store.get("counter"), Some(json!(1)));
        assert!(store.delete("counter"));
        assert!(!store.delete("counter"));
        assert_eq!(store.get("counter"), None);
    }

    #[test]
    fn snapshot_is_a_plain_object() {
        let store = VariableStore::new();
        store.set("goal", json!(1000));
        let snap = store.snapshot();
        assert_eq!(snap["goal"], json!(1000));
    }

    #[test]
    fn set_refreshes_timestamp() {
        let store = VariableStore::new();
        store.set("k", json!(1));
        let first = store.list()["k"].updated_at;
        store.set("k", json!(2));
        let second = store.list()["k"].updated_at;
        assert!(second >= first);
    }
}
