//! Flow data model.
//!
//! A [`Flow`] is a user-defined trigger→condition→action automation rule.
//! Flows are created and edited through the management interface and
//! evaluated read-only by the engine; the engine never mutates a flow as a
//! side effect of running it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What the engine does with the remaining actions after one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the flow at the failing action. The default.
    #[default]
    Abort,
    /// Record the failure and keep executing the remaining actions.
    Continue,
}

/// Boolean combinator for a condition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOp {
    /// Every child must match (short-circuits on the first false).
    All,
    /// At least one child must match (short-circuits on the first true).
    Any,
}

/// One leaf comparison: `field <operator> value`.
///
/// `field` is a dotted path into the evaluation scope (event payload merged
/// with the variable store); `operator` is resolved through the condition
/// registry at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionLeaf {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

/// A nested condition tree of AND/OR groups over leaf comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group {
        op: GroupOp,
        children: Vec<ConditionNode>,
    },
    Leaf(ConditionLeaf),
}

/// One action invocation: a registry type tag plus parameters.
///
/// String parameters may contain `{field}` interpolation tokens, resolved
/// against the event payload first and the variable store second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// A stored flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    pub name: String,
    /// Trigger type tag, resolved through the trigger registry.
    pub trigger: String,
    /// Trigger-specific parameters (e.g. `{"interval_secs": 60}` for timers).
    #[serde(default)]
    pub trigger_params: Value,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
    pub actions: Vec<ActionSpec>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    pub created_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

/// Payload for creating or replacing a flow; the engine assigns id and
/// creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDraft {
    pub name: String,
    pub trigger: String,
    #[serde(default)]
    pub trigger_params: Value,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

impl FlowDraft {
    /// Materializes the draft into a stored flow.
    pub fn into_flow(self) -> Flow {
        Flow {
            id: Uuid::new_v4(),
            name: self.name,
            trigger: self.trigger,
            trigger_params: self.trigger_params,
            condition: self.condition,
            actions: self.actions,
            enabled: self.enabled,
            on_error: self.on_error,
            created_at: Utc::now(),
        }
    }
}
