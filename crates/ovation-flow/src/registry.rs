//! Trigger, condition-operator, and action registries.
//!
//! Each registry starts with built-in entries (see [`crate::builtin`]) and
//! accepts additional entries contributed by extensions during their
//! initialization hook. The engine resolves every lookup through the
//! registry, so built-in and extension-contributed entries are handled
//! identically — there is no special-casing by origin.
//!
//! Re-registering an existing type tag overwrites the previous entry
//! (last-registered wins) and is logged as a notice, not an error.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use ovation_core::{BoxError, LiveEvent};

use crate::variables::VariableStore;

// ============================================================================
// Entry types
// ============================================================================

/// Predicate deciding whether an incoming event fires a trigger.
pub type TriggerMatcher = Arc<dyn Fn(&LiveEvent) -> bool + Send + Sync>;

/// A trigger definition.
#[derive(Clone)]
pub struct TriggerDef {
    pub tag: String,
    pub label: String,
    pub description: String,
    /// Parameter schema surfaced to the management UI.
    pub params_schema: Value,
    pub matcher: TriggerMatcher,
}

/// Pure evaluator for one condition operator: `actual <op> expected`.
pub type OperatorFn =
    Arc<dyn Fn(&Value, &Value) -> Result<bool, crate::error::ConditionError> + Send + Sync>;

/// A condition-operator definition.
#[derive(Clone)]
pub struct OperatorDef {
    pub tag: String,
    pub label: String,
    pub eval: OperatorFn,
}

/// Pushes a payload to connected channel clients. Implemented by the
/// channel hub; injected so the built-in `broadcast` action and extension
/// actions can reach connections without the engine knowing about sockets.
pub trait Broadcaster: Send + Sync {
    /// Broadcasts on a fully-qualified channel name (`source:event`).
    fn broadcast(&self, channel: &str, payload: Value);
}

/// Services an action executor may use.
#[derive(Clone)]
pub struct ActionContext {
    /// The evaluation payload the run was matched against.
    pub event: Value,
    pub variables: Arc<VariableStore>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
    pub http: reqwest::Client,
}

/// Executes one action with already-interpolated parameters.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, BoxError>;
}

/// An action definition.
#[derive(Clone)]
pub struct ActionDef {
    pub tag: String,
    pub label: String,
    pub description: String,
    pub params_schema: Value,
    pub executor: Arc<dyn ActionExecutor>,
}

// ============================================================================
// Generic registry
// ============================================================================

/// Tag-keyed registry preserving first-registration order for listings.
pub struct Registry<T> {
    name: &'static str,
    entries: RwLock<Vec<(String, T)>>,
}

impl<T: Clone> Registry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Inserts `entry` under `tag`. Re-registering an existing tag replaces
    /// the previous entry in place and logs a notice.
    pub fn register(&self, tag: &str, entry: T) {
        let mut entries = self.entries.write();
        if let Some(slot) = entries.iter_mut().find(|(t, _)| t == tag) {
            info!(
                registry = self.name,
                tag, "Overwriting existing definition (last registration wins)"
            );
            slot.1 = entry;
        } else {
            entries.push((tag.to_string(), entry));
        }
    }

    pub fn get(&self, tag: &str) -> Option<T> {
        self.entries
            .read()
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, e)| e.clone())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.read().iter().any(|(t, _)| t == tag)
    }

    /// All entries in first-registration order.
    pub fn entries(&self) -> Vec<T> {
        self.entries.read().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ============================================================================
// Registry set + UI summaries
// ============================================================================

/// Serializable summary of one definition, for the introspection API.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionSummary {
    pub tag: String,
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params_schema: Value,
}

/// All available definitions, grouped for the management UI.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionCatalog {
    pub triggers: Vec<DefinitionSummary>,
    pub operators: Vec<DefinitionSummary>,
    pub actions: Vec<DefinitionSummary>,
}

/// The three registries the engine evaluates against.
pub struct Registries {
    pub triggers: Registry<TriggerDef>,
    pub operators: Registry<OperatorDef>,
    pub actions: Registry<ActionDef>,
}

impl Registries {
    /// Creates empty registries. Call [`crate::builtin::install`] to seed
    /// the built-in entries.
    pub fn new() -> Self {
        Self {
            triggers: Registry::new("trigger"),
            operators: Registry::new("operator"),
            actions: Registry::new("action"),
        }
    }

    /// Lists every definition for the introspection API.
    pub fn catalog(&self) -> DefinitionCatalog {
        DefinitionCatalog {
            triggers: self
                .triggers
                .entries()
                .into_iter()
                .map(|d| DefinitionSummary {
                    tag: d.tag,
                    label: d.label,
                    description: d.description,
                    params_schema: d.params_schema,
                })
                .collect(),
            operators: self
                .operators
                .entries()
                .into_iter()
                .map(|d| DefinitionSummary {
                    tag: d.tag,
                    label: d.label,
                    description: String::new(),
                    params_schema: Value::Null,
                })
                .collect(),
            actions: self
                .actions
                .entries()
                .into_iter()
                .map(|d| DefinitionSummary {
                    tag: d.tag,
                    label: d.label,
                    description: d.description,
                    params_schema: d.params_schema,
                })
                .collect(),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger(tag: &str, label: &str) -> TriggerDef {
        TriggerDef {
            tag: tag.into(),
            label: label.into(),
            description: String::new(),
            params_schema: json!(null),
            matcher: Arc::new(|_| false),
        }
    }

    #[test]
    fn last_registration_wins() {
        let registry: Registry<TriggerDef> = Registry::new("trigger");
        registry.register("gift", trigger("gift", "first"));
        registry.register("gift", trigger("gift", "second"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("gift").unwrap().label, "second");
    }

    #[test]
    fn listing_preserves_first_registration_order() {
        let registry: Registry<TriggerDef> = Registry::new("trigger");
        registry.register("a", trigger("a", "a"));
        registry.register("b", trigger("b", "b"));
        registry.register("a", trigger("a", "a2"));

        let tags: Vec<String> = registry.entries().into_iter().map(|d| d.tag).collect();
        assert_eq!(tags, vec!["a", "b"]);
    }
}
