//! Built-in registry entries.
//!
//! Seeds the registries with one trigger per live-event kind plus the timer
//! trigger, the closed set of condition operators, and the core action set.
//! Extensions contribute further entries through the capability API; the
//! engine treats both populations identically.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, error, info, trace, warn};

use ovation_core::{BoxError, EventKind};

use crate::operator::ConditionOperator;
use crate::registry::{ActionContext, ActionDef, ActionExecutor, OperatorDef, Registries, TriggerDef};

/// Trigger tag for time-based flows, driven by the timer subsystem rather
/// than the event stream.
pub const TIMER_TRIGGER: &str = "timer";

/// Installs every built-in trigger, operator, and action.
pub fn install(registries: &Registries) {
    install_triggers(registries);
    install_operators(registries);
    install_actions(registries);
}

fn install_triggers(registries: &Registries) {
    for kind in EventKind::ALL {
        let kind = *kind;
        registries.triggers.register(
            kind.as_str(),
            TriggerDef {
                tag: kind.as_str().to_string(),
                label: trigger_label(kind).to_string(),
                description: String::new(),
                params_schema: Value::Null,
                matcher: Arc::new(move |event| event.kind() == kind),
            },
        );
    }

    // Never matched against the stream; fired by the timer subsystem.
    registries.triggers.register(
        TIMER_TRIGGER,
        TriggerDef {
            tag: TIMER_TRIGGER.to_string(),
            label: "Timer".to_string(),
            description: "Fires on a fixed interval, independent of the event stream".to_string(),
            params_schema: json!({
                "interval_secs": {"type": "integer", "minimum": 1}
            }),
            matcher: Arc::new(|_| false),
        },
    );
}

fn trigger_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Chat => "Chat message",
        EventKind::Gift => "Gift received",
        EventKind::Follow => "New follower",
        EventKind::Share => "Stream shared",
        EventKind::Like => "Likes received",
        EventKind::Subscribe => "New subscriber",
        EventKind::ViewerCount => "Viewer count changed",
        EventKind::Connected => "Source connected",
        EventKind::Disconnected => "Source disconnected",
        EventKind::SourceError => "Source error",
    }
}

fn install_operators(registries: &Registries) {
    for op in ConditionOperator::ALL {
        let op = *op;
        registries.operators.register(
            op.as_str(),
            OperatorDef {
                tag: op.as_str().to_string(),
                label: op.label().to_string(),
                eval: Arc::new(move |actual, expected| op.evaluate(actual, expected)),
            },
        );
    }
}

// ============================================================================
// Built-in actions
// ============================================================================

struct LogAction;

#[async_trait]
impl ActionExecutor for LogAction {
    async fn execute(&self, params: &Value, _ctx: &ActionContext) -> Result<Value, BoxError> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .ok_or("log action requires a 'message' parameter")?;
        match params.get("level").and_then(Value::as_str).unwrap_or("info") {
            "trace" => trace!("{message}"),
            "debug" => debug!("{message}"),
            "warn" => warn!("{message}"),
            "error" => error!("{message}"),
            _ => info!("{message}"),
        }
        Ok(Value::Null)
    }
}

struct SetVariableAction;

#[async_trait]
impl ActionExecutor for SetVariableAction {
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, BoxError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or("set_variable action requires a 'name' parameter")?;
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        ctx.variables.set(name, value.clone());
        Ok(value)
    }
}

struct DeleteVariableAction;

#[async_trait]
impl ActionExecutor for DeleteVariableAction {
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, BoxError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or("delete_variable action requires a 'name' parameter")?;
        Ok(Value::Bool(ctx.variables.delete(name)))
    }
}

/// Suspends the flow's action pipeline without blocking the event loop.
/// Action N+1 of the same flow starts only after the delay settles; other
/// flows and handlers interleave freely in the meantime.
struct DelayAction;

#[async_trait]
impl ActionExecutor for DelayAction {
    async fn execute(&self, params: &Value, _ctx: &ActionContext) -> Result<Value, BoxError> {
        let ms = params
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or("delay action requires an integer 'ms' parameter")?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(Value::Null)
    }
}

struct HttpRequestAction;

#[async_trait]
impl ActionExecutor for HttpRequestAction {
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, BoxError> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or("http_request action requires a 'url' parameter")?;
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("POST")
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => ctx.http.get(url),
            "POST" => ctx.http.post(url),
            "PUT" => ctx.http.put(url),
            "DELETE" => ctx.http.delete(url),
            other => return Err(format!("unsupported HTTP method: {other}").into()),
        };
        if let Some(body) = params.get("body") {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(format!("request to {url} failed with status {status}").into());
        }
        Ok(json!({"status": status}))
    }
}

struct BroadcastAction;

#[async_trait]
impl ActionExecutor for BroadcastAction {
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, BoxError> {
        let channel = params
            .get("channel")
            .and_then(Value::as_str)
            .ok_or("broadcast action requires a 'channel' parameter")?;
        let payload = params.get("payload").cloned().unwrap_or(Value::Null);

        let broadcaster = ctx
            .broadcaster
            .as_ref()
            .ok_or("no channel hub is attached to the engine")?;
        broadcaster.broadcast(channel, payload);
        Ok(Value::Null)
    }
}

fn action(
    tag: &str,
    label: &str,
    description: &str,
    params_schema: Value,
    executor: Arc<dyn ActionExecutor>,
) -> ActionDef {
    ActionDef {
        tag: tag.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        params_schema,
        executor,
    }
}

fn install_actions(registries: &Registries) {
    registries.actions.register(
        "log",
        action(
            "log",
            "Write a log line",
            "Logs an interpolated message at the given level",
            json!({"message": {"type": "string"}, "level": {"enum": ["trace", "debug", "info", "warn", "error"]}}),
            Arc::new(LogAction),
        ),
    );
    registries.actions.register(
        "set_variable",
        action(
            "set_variable",
            "Set a variable",
            "Stores a value in the shared variable store",
            json!({"name": {"type": "string"}, "value": {}}),
            Arc::new(SetVariableAction),
        ),
    );
    registries.actions.register(
        "delete_variable",
        action(
            "delete_variable",
            "Delete a variable",
            "Removes a value from the shared variable store",
            json!({"name": {"type": "string"}}),
            Arc::new(DeleteVariableAction),
        ),
    );
    registries.actions.register(
        "delay",
        action(
            "delay",
            "Wait",
            "Pauses this flow's action pipeline for the given milliseconds",
            json!({"ms": {"type": "integer", "minimum": 0}}),
            Arc::new(DelayAction),
        ),
    );
    registries.actions.register(
        "http_request",
        action(
            "http_request",
            "HTTP request",
            "Calls an external URL with an optional JSON body",
            json!({
                "url": {"type": "string"},
                "method": {"enum": ["GET", "POST", "PUT", "DELETE"]},
                "body": {},
            }),
            Arc::new(HttpRequestAction),
        ),
    );
    registries.actions.register(
        "broadcast",
        action(
            "broadcast",
            "Broadcast to overlays",
            "Pushes a payload to every connected channel client",
            json!({"channel": {"type": "string"}, "payload": {}}),
            Arc::new(BroadcastAction),
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableStore;
    use ovation_core::{Actor, GiftEvent, LiveEvent};

    fn ctx() -> ActionContext {
        ActionContext {
            event: json!({}),
            variables: Arc::new(VariableStore::new()),
            broadcaster: None,
            http: reqwest::Client::new(),
        }
    }

    #[test]
    fn installs_every_builtin() {
        let registries = Registries::new();
        install(&registries);

        // One trigger per event kind plus the timer.
        assert_eq!(registries.triggers.len(), EventKind::ALL.len() + 1);
        assert_eq!(registries.operators.len(), ConditionOperator::ALL.len());
        assert!(registries.actions.contains("log"));
        assert!(registries.actions.contains("delay"));
        assert!(registries.actions.contains("http_request"));
    }

    #[test]
    fn gift_trigger_matches_gift_events_only() {
        let registries = Registries::new();
        install(&registries);

        let def = registries.triggers.get("gift").unwrap();
        let event = LiveEvent::Gift(GiftEvent {
            actor: Actor {
                user_id: "u".into(),
                username: "bob".into(),
            },
            gift_name: "rose".into(),
            coins: 1,
            repeat_count: 1,
            timestamp: chrono::Utc::now(),
        });
        assert!((def.matcher)(&event));

        let timer = registries.triggers.get(TIMER_TRIGGER).unwrap();
        assert!(!(timer.matcher)(&event));
    }

    #[tokio::test]
    async fn set_and_delete_variable_actions() {
        let registries = Registries::new();
        install(&registries);
        let ctx = ctx();

        let set = registries.actions.get("set_variable").unwrap();
        set.executor
            .execute(&json!({"name": "goal", "value": 500}), &ctx)
            .await
            .unwrap();
        assert_eq!(ctx.variables.get("goal"), Some(json!(500)));

        let del = registries.actions.get("delete_variable").unwrap();
        let out = del
            .executor
            .execute(&json!({"name": "goal"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, Value::Bool(true));
        assert_eq!(ctx.variables.get("goal"), None);
    }

    #[tokio::test]
    async fn log_action_requires_message() {
        let registries = Registries::new();
        install(&registries);
        let def = registries.actions.get("log").unwrap();
        assert!(def.executor.execute(&json!({}), &ctx()).await.is_err());
    }
}
