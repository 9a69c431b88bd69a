//! The flow engine.
//!
//! For every enabled flow whose trigger matches an incoming event, the
//! engine evaluates the flow's condition tree against the event payload
//! merged with the current variable store, and on a match executes the
//! flow's actions **in order**. Distinct flows matching the same event are
//! independent executions, evaluated in registration order — that order is
//! part of the engine's contract, not a scheduler accident.
//!
//! Failure containment:
//! - a condition referencing a missing field is a logged non-match,
//! - a failing condition evaluator is a logged non-match,
//! - a failing action is recorded in the run's [`ExecutionRecord`]; the
//!   remaining actions abort or continue per the flow's [`ErrorPolicy`].
//!
//! Nothing evaluated here can propagate a failure into the host.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{Level, debug, span, warn};
use uuid::Uuid;

use ovation_core::{BoxError, EventHandler, LiveEvent, SettingsStore};

use crate::builtin::TIMER_TRIGGER;
use crate::error::{FlowError, FlowResult};
use crate::history::{
    ActionOutcome, ActionResult, ExecutionHistory, ExecutionOrigin, ExecutionRecord, RunOutcome,
};
use crate::model::{ConditionNode, ErrorPolicy, Flow, FlowDraft};
use crate::registry::{ActionContext, Broadcaster, Registries};
use crate::template::{lookup_path, render_params};
use crate::variables::VariableStore;

/// Settings-store namespace and key the flow list persists under.
const FLOWS_NAMESPACE: &str = "automation";
const FLOWS_KEY: &str = "flows";

/// Holds flow definitions and evaluates them against the live event stream.
pub struct FlowEngine {
    registries: Arc<Registries>,
    variables: Arc<VariableStore>,
    history: ExecutionHistory,
    flows: RwLock<Vec<Flow>>,
    broadcaster: RwLock<Option<Arc<dyn Broadcaster>>>,
    http: reqwest::Client,
    settings: Option<Arc<SettingsStore>>,
}

impl FlowEngine {
    /// Creates an engine with no persistence.
    pub fn new(
        registries: Arc<Registries>,
        variables: Arc<VariableStore>,
        history_capacity: usize,
    ) -> Self {
        Self {
            registries,
            variables,
            history: ExecutionHistory::new(history_capacity),
            flows: RwLock::new(Vec::new()),
            broadcaster: RwLock::new(None),
            http: reqwest::Client::new(),
            settings: None,
        }
    }

    /// Creates an engine that loads and persists flows through the settings
    /// store. A corrupt stored flow list is a typed error, not an empty list.
    pub fn with_persistence(
        registries: Arc<Registries>,
        variables: Arc<VariableStore>,
        history_capacity: usize,
        settings: Arc<SettingsStore>,
    ) -> FlowResult<Self> {
        let flows: Vec<Flow> = settings
            .get_as(FLOWS_NAMESPACE, FLOWS_KEY)
            .map_err(FlowError::Storage)?
            .unwrap_or_default();
        let engine = Self {
            registries,
            variables,
            history: ExecutionHistory::new(history_capacity),
            flows: RwLock::new(flows),
            broadcaster: RwLock::new(None),
            http: reqwest::Client::new(),
            settings: Some(settings),
        };
        Ok(engine)
    }

    /// Attaches the channel hub used by the `broadcast` action.
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn Broadcaster>) {
        *self.broadcaster.write() = Some(broadcaster);
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    // ─── Flow management ─────────────────────────────────────────────────

    /// All flows, in registration (and therefore evaluation) order.
    pub fn flows(&self) -> Vec<Flow> {
        self.flows.read().clone()
    }

    pub fn flow(&self, id: Uuid) -> Option<Flow> {
        self.flows.read().iter().find(|f| f.id == id).cloned()
    }

    /// Creates a flow from a draft. The trigger must be known to the
    /// registry at creation time.
    pub fn create_flow(&self, draft: FlowDraft) -> FlowResult<Flow> {
        if !self.registries.triggers.contains(&draft.trigger) {
            return Err(FlowError::UnknownTrigger(draft.trigger));
        }
        let flow = draft.into_flow();
        self.flows.write().push(flow.clone());
        self.persist()?;
        Ok(flow)
    }

    /// Replaces a flow's definition, keeping its id, position, and creation
    /// timestamp.
    pub fn update_flow(&self, id: Uuid, draft: FlowDraft) -> FlowResult<Flow> {
        if !self.registries.triggers.contains(&draft.trigger) {
            return Err(FlowError::UnknownTrigger(draft.trigger));
        }
        let updated = {
            let mut flows = self.flows.write();
            let slot = flows
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or(FlowError::NotFound(id))?;
            let mut flow = draft.into_flow();
            flow.id = slot.id;
            flow.created_at = slot.created_at;
            *slot = flow.clone();
            flow
        };
        self.persist()?;
        Ok(updated)
    }

    /// Deletes a flow. Its execution history is retained.
    pub fn delete_flow(&self, id: Uuid) -> FlowResult<()> {
        let removed = {
            let mut flows = self.flows.write();
            let before = flows.len();
            flows.retain(|f| f.id != id);
            flows.len() != before
        };
        if !removed {
            return Err(FlowError::NotFound(id));
        }
        self.persist()
    }

    /// Enables or disables a flow. Disabling takes effect immediately: the
    /// next event sees the updated flag before any trigger matching.
    pub fn set_enabled(&self, id: Uuid, enabled: bool) -> FlowResult<Flow> {
        let flow = {
            let mut flows = self.flows.write();
            let slot = flows
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or(FlowError::NotFound(id))?;
            slot.enabled = enabled;
            slot.clone()
        };
        self.persist()?;
        Ok(flow)
    }

    /// Enabled timer-triggered flows with their interval, for the timer
    /// subsystem to reconcile against.
    pub fn timer_flows(&self) -> Vec<(Uuid, u64)> {
        self.flows
            .read()
            .iter()
            .filter(|f| f.enabled && f.trigger == TIMER_TRIGGER)
            .map(|f| {
                let interval = f
                    .trigger_params
                    .get("interval_secs")
                    .and_then(Value::as_u64)
                    .unwrap_or(60);
                (f.id, interval.max(1))
            })
            .collect()
    }

    fn persist(&self) -> FlowResult<()> {
        if let Some(settings) = &self.settings {
            let value = serde_json::to_value(&*self.flows.read())
                .expect("flow serialization is infallible");
            settings
                .set(FLOWS_NAMESPACE, FLOWS_KEY, value)
                .map_err(FlowError::Storage)?;
        }
        Ok(())
    }

    // ─── Evaluation ──────────────────────────────────────────────────────

    /// Evaluates every enabled flow against one incoming event.
    pub async fn handle_event(&self, event: &LiveEvent) {
        let payload = event.payload();
        let flows: Vec<Flow> = self
            .flows
            .read()
            .iter()
            .filter(|f| f.enabled)
            .cloned()
            .collect();

        for flow in flows {
            let span = span!(Level::DEBUG, "flow", name = %flow.name);
            let _enter = span.enter();

            let Some(trigger) = self.registries.triggers.get(&flow.trigger) else {
                warn!(trigger = %flow.trigger, "Flow references an unknown trigger, skipping");
                continue;
            };
            if !(trigger.matcher)(event) {
                continue;
            }
            if !self.condition_matches(&flow, &payload) {
                continue;
            }

            let record = self
                .run_actions(&flow, payload.clone(), ExecutionOrigin::Event)
                .await;
            self.history.push(record);
        }
    }

    /// Runs one flow by id: evaluates its condition against `payload` and,
    /// on a match, executes its actions. Returns `None` when the condition
    /// did not match. Works on disabled flows too — this is the explicit
    /// operator path, not trigger matching.
    pub async fn run_flow(
        &self,
        id: Uuid,
        payload: Value,
        origin: ExecutionOrigin,
    ) -> FlowResult<Option<ExecutionRecord>> {
        let flow = self.flow(id).ok_or(FlowError::NotFound(id))?;
        if !self.condition_matches(&flow, &payload) {
            return Ok(None);
        }
        let record = self.run_actions(&flow, payload, origin).await;
        self.history.push(record.clone());
        Ok(Some(record))
    }

    /// Test-executes a flow's action list against caller-supplied sample
    /// data, bypassing both trigger matching and the condition tree.
    pub async fn test_flow(&self, id: Uuid, sample: Value) -> FlowResult<ExecutionRecord> {
        let flow = self.flow(id).ok_or(FlowError::NotFound(id))?;
        let record = self.run_actions(&flow, sample, ExecutionOrigin::Test).await;
        self.history.push(record.clone());
        Ok(record)
    }

    fn condition_matches(&self, flow: &Flow, payload: &Value) -> bool {
        match &flow.condition {
            None => true,
            Some(node) => {
                let scope = merge_scope(payload, &self.variables.snapshot());
                let matched = self.eval_node(node, &scope);
                if !matched {
                    debug!(flow = %flow.name, "Condition not met");
                }
                matched
            }
        }
    }

    /// Evaluates one condition node. `all` groups short-circuit on the
    /// first false child, `any` groups on the first true one; an empty
    /// `all` is vacuously true and an empty `any` is false.
    fn eval_node(&self, node: &ConditionNode, scope: &Value) -> bool {
        match node {
            ConditionNode::Group {
                op: crate::model::GroupOp::All,
                children,
            } => children.iter().all(|c| self.eval_node(c, scope)),
            ConditionNode::Group {
                op: crate::model::GroupOp::Any,
                children,
            } => children.iter().any(|c| self.eval_node(c, scope)),
            ConditionNode::Leaf(leaf) => {
                let Some(op) = self.registries.operators.get(&leaf.operator) else {
                    warn!(operator = %leaf.operator, "Unknown condition operator, treating as non-match");
                    return false;
                };
                let Some(actual) = lookup_path(scope, &leaf.field) else {
                    debug!(field = %leaf.field, "Condition field missing, treating as non-match");
                    return false;
                };
                match (op.eval)(actual, &leaf.value) {
                    Ok(matched) => matched,
                    Err(e) => {
                        warn!(
                            field = %leaf.field,
                            operator = %leaf.operator,
                            error = %e,
                            "Condition evaluation failed, treating as non-match"
                        );
                        false
                    }
                }
            }
        }
    }

    async fn run_actions(
        &self,
        flow: &Flow,
        payload: Value,
        origin: ExecutionOrigin,
    ) -> ExecutionRecord {
        let mut outcomes = Vec::with_capacity(flow.actions.len());
        let mut outcome = RunOutcome::Completed;

        for spec in &flow.actions {
            // Re-snapshot variables for every action so an earlier
            // `set_variable` is visible to later templates in the same run.
            let vars = self.variables.snapshot();
            let rendered = render_params(&spec.params, &[&payload, &vars]);

            let result: Result<Value, BoxError> = match self.registries.actions.get(&spec.action) {
                None => Err(format!("unknown action type: '{}'", spec.action).into()),
                Some(def) => {
                    let ctx = ActionContext {
                        event: payload.clone(),
                        variables: Arc::clone(&self.variables),
                        broadcaster: self.broadcaster.read().clone(),
                        http: self.http.clone(),
                    };
                    def.executor.execute(&rendered, &ctx).await
                }
            };

            match result {
                Ok(output) => outcomes.push(ActionOutcome {
                    action: spec.action.clone(),
                    params: rendered,
                    result: ActionResult::Ok { output },
                }),
                Err(e) => {
                    warn!(
                        flow = %flow.name,
                        action = %spec.action,
                        error = %e,
                        "Action execution failed"
                    );
                    outcomes.push(ActionOutcome {
                        action: spec.action.clone(),
                        params: rendered,
                        result: ActionResult::Error {
                            message: e.to_string(),
                        },
                    });
                    match flow.on_error {
                        ErrorPolicy::Abort => {
                            outcome = RunOutcome::Aborted;
                            break;
                        }
                        ErrorPolicy::Continue => outcome = RunOutcome::CompletedWithErrors,
                    }
                }
            }
        }

        ExecutionRecord {
            id: Uuid::new_v4(),
            flow_id: flow.id,
            flow_name: flow.name.clone(),
            trigger: flow.trigger.clone(),
            origin,
            event: payload,
            actions: outcomes,
            outcome,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Merges the event payload over a variable snapshot: payload fields win.
fn merge_scope(payload: &Value, vars: &Value) -> Value {
    let mut map = match vars {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    if let Value::Object(event) = payload {
        for (k, v) in event {
            map.insert(k.clone(), v.clone());
        }
    }
    Value::Object(map)
}

/// The engine is the bus sink: every dispatched event lands here after the
/// core and extension handlers.
#[async_trait]
impl EventHandler for FlowEngine {
    async fn handle(&self, event: Arc<LiveEvent>) -> Result<(), BoxError> {
        self.handle_event(&event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::model::{ActionSpec, ConditionLeaf, GroupOp};
    use crate::registry::ActionExecutor;
    use chrono::Utc;
    use ovation_core::{Actor, GiftEvent};
    use serde_json::json;

    fn engine() -> FlowEngine {
        let registries = Arc::new(Registries::new());
        builtin::install(&registries);
        FlowEngine::new(registries, Arc::new(VariableStore::new()), 16)
    }

    fn gift_event(coins: u64) -> LiveEvent {
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

    fn gift_flow(name: &str, min_coins: u64) -> FlowDraft {
        FlowDraft {
            name: name.into(),
            trigger: "gift".into(),
            trigger_params: Value::Null,
            condition: Some(ConditionNode::Leaf(ConditionLeaf {
                field: "coins".into(),
                operator: "gte".into(),
                value: json!(min_coins),
            })),
            actions: vec![ActionSpec {
                action: "set_variable".into(),
                params: json!({"name": "last_gifter", "value": "{username}"}),
            }],
            enabled: true,
            on_error: ErrorPolicy::Abort,
        }
    }

    struct FailingAction;

    #[async_trait]
    impl ActionExecutor for FailingAction {
        async fn execute(&self, _params: &Value, _ctx: &ActionContext) -> Result<Value, BoxError> {
            Err("intentional failure".into())
        }
    }

    #[tokio::test]
    async fn condition_boundary_is_inclusive() {
        let engine = engine();
        engine.create_flow(gift_flow("big gift", 100)).unwrap();

        engine.handle_event(&gift_event(99)).await;
        assert!(engine.history().is_empty());

        engine.handle_event(&gift_event(100)).await;
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.variables().get("last_gifter"), Some(json!("bob")));
    }

    #[tokio::test]
    async fn two_flows_on_one_trigger_both_execute() {
        let engine = engine();
        engine.create_flow(gift_flow("first", 1)).unwrap();
        engine.create_flow(gift_flow("second", 1)).unwrap();

        engine.handle_event(&gift_event(10)).await;

        let recent = engine.history().recent(10);
        assert_eq!(recent.len(), 2);
        // Newest first: registration order is "first" then "second".
        assert_eq!(recent[1].flow_name, "first");
        assert_eq!(recent[0].flow_name, "second");
    }

    #[tokio::test]
    async fn disabled_flow_stops_matching_but_keeps_history() {
        let engine = engine();
        let flow = engine.create_flow(gift_flow("toggle", 1)).unwrap();

        engine.handle_event(&gift_event(10)).await;
        assert_eq!(engine.history().len(), 1);

        engine.set_enabled(flow.id, false).unwrap();
        engine.handle_event(&gift_event(10)).await;

        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history().for_flow(flow.id, 10).len(), 1);
    }

    #[tokio::test]
    async fn missing_field_is_a_non_match() {
        let engine = engine();
        let mut draft = gift_flow("missing", 1);
        draft.condition = Some(ConditionNode::Leaf(ConditionLeaf {
            field: "no_such_field".into(),
            operator: "eq".into(),
            value: json!(1),
        }));
        engine.create_flow(draft).unwrap();

        engine.handle_event(&gift_event(10)).await;
        assert!(engine.history().is_empty());
    }

    #[tokio::test]
    async fn condition_groups_combine() {
        let engine = engine();
        let mut draft = gift_flow("group", 1);
        draft.condition = Some(ConditionNode::Group {
            op: GroupOp::All,
            children: vec![
                ConditionNode::Leaf(ConditionLeaf {
                    field: "coins".into(),
                    operator: "gte".into(),
                    value: json!(5),
                }),
                ConditionNode::Group {
                    op: GroupOp::Any,
                    children: vec![
                        ConditionNode::Leaf(ConditionLeaf {
                            field: "username".into(),
                            operator: "eq".into(),
                            value: json!("alice"),
                        }),
                        ConditionNode::Leaf(ConditionLeaf {
                            field: "username".into(),
                            operator: "eq".into(),
                            value: json!("bob"),
                        }),
                    ],
                },
            ],
        });
        engine.create_flow(draft).unwrap();

        engine.handle_event(&gift_event(10)).await;
        assert_eq!(engine.history().len(), 1);

        engine.handle_event(&gift_event(1)).await;
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn abort_policy_skips_remaining_actions() {
        let engine = engine();
        engine.registries().actions.register(
            "fail",
            crate::registry::ActionDef {
                tag: "fail".into(),
                label: "fail".into(),
                description: String::new(),
                params_schema: Value::Null,
                executor: Arc::new(FailingAction),
            },
        );

        let mut draft = gift_flow("aborts", 1);
        draft.condition = None;
        draft.actions = vec![
            ActionSpec {
                action: "fail".into(),
                params: Value::Null,
            },
            ActionSpec {
                action: "set_variable".into(),
                params: json!({"name": "ran", "value": true}),
            },
        ];
        engine.create_flow(draft).unwrap();

        engine.handle_event(&gift_event(1)).await;

        let record = &engine.history().recent(1)[0];
        assert_eq!(record.outcome, RunOutcome::Aborted);
        assert_eq!(record.actions.len(), 1);
        assert_eq!(engine.variables().get("ran"), None);
    }

    #[tokio::test]
    async fn continue_policy_runs_remaining_actions() {
        let engine = engine();
        engine.registries().actions.register(
            "fail",
            crate::registry::ActionDef {
                tag: "fail".into(),
                label: "fail".into(),
                description: String::new(),
                params_schema: Value::Null,
                executor: Arc::new(FailingAction),
            },
        );

        let mut draft = gift_flow("continues", 1);
        draft.condition = None;
        draft.on_error = ErrorPolicy::Continue;
        draft.actions = vec![
            ActionSpec {
                action: "fail".into(),
                params: Value::Null,
            },
            ActionSpec {
                action: "set_variable".into(),
                params: json!({"name": "ran", "value": true}),
            },
        ];
        engine.create_flow(draft).unwrap();

        engine.handle_event(&gift_event(1)).await;

        let record = &engine.history().recent(1)[0];
        assert_eq!(record.outcome, RunOutcome::CompletedWithErrors);
        assert_eq!(record.actions.len(), 2);
        assert_eq!(engine.variables().get("ran"), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_flow_bypasses_conditions() {
        let engine = engine();
        let flow = engine.create_flow(gift_flow("strict", 1_000_000)).unwrap();

        let record = engine
            .test_flow(flow.id, json!({"username": "tester", "coins": 1}))
            .await
            .unwrap();
        assert_eq!(record.origin, ExecutionOrigin::Test);
        assert_eq!(record.outcome, RunOutcome::Completed);
        assert_eq!(engine.variables().get("last_gifter"), Some(json!("tester")));
    }

    #[tokio::test]
    async fn variables_participate_in_conditions() {
        let engine = engine();
        engine.variables().set("min_coins", json!(50));

        let mut draft = gift_flow("dynamic", 1);
        draft.condition = Some(ConditionNode::Leaf(ConditionLeaf {
            field: "min_coins".into(),
            operator: "lte".into(),
            value: json!(100),
        }));
        engine.create_flow(draft).unwrap();

        engine.handle_event(&gift_event(10)).await;
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn create_rejects_unknown_trigger() {
        let engine = engine();
        let mut draft = gift_flow("bad", 1);
        draft.trigger = "no_such_trigger".into();
        assert!(matches!(
            engine.create_flow(draft),
            Err(FlowError::UnknownTrigger(_))
        ));
    }

    #[test]
    fn flows_persist_through_settings() {
        let registries = Arc::new(Registries::new());
        builtin::install(&registries);
        let settings = Arc::new(SettingsStore::in_memory());

        let engine = FlowEngine::with_persistence(
            Arc::clone(&registries),
            Arc::new(VariableStore::new()),
            16,
            Arc::clone(&settings),
        )
        .unwrap();
        let flow = engine.create_flow(gift_flow("kept", 1)).unwrap();
        drop(engine);

        let engine = FlowEngine::with_persistence(
            registries,
            Arc::new(VariableStore::new()),
            16,
            settings,
        )
        .unwrap();
        assert_eq!(engine.flows().len(), 1);
        assert_eq!(engine.flows()[0].id, flow.id);
    }
}
