//! Companion Demo
//!
//! A self-contained demonstration of the Ovation runtime:
//!
//! - a scripted event source replaying a short live session,
//! - a "greeter" extension that subscribes to chat, registers a route and a
//!   channel, and contributes a custom `cheer` action to the registries,
//! - two flows created at startup (one gift threshold, one using the
//!   contributed action).
//!
//! # Usage
//!
//! ```bash
//! cargo run --package companion-demo
//! ```
//!
//! Then, while it runs:
//!
//! ```bash
//! curl http://127.0.0.1:8090/api/extensions
//! curl http://127.0.0.1:8090/api/automation/history
//! curl http://127.0.0.1:8090/ext/greeter/stats
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use ovation::core::{Actor, BoxError, ChatEvent, ConnectionEvent, GiftEvent, ViewerCountEvent};
use ovation::extension::ExtensionFactory;
use ovation::flow::{ActionSpec, ConditionLeaf, ErrorPolicy, FlowDraft};
use ovation::prelude::*;

// ============================================================================
// Greeter extension
// ============================================================================

/// Counts chat messages, serves the count over a route, and answers pings
/// on a channel.
struct Greeter {
    chats_seen: Arc<AtomicU64>,
}

struct StatsRoute {
    chats_seen: Arc<AtomicU64>,
}

#[async_trait]
impl RouteHandler for StatsRoute {
    async fn handle(&self, _request: RouteRequest) -> Result<Value, BoxError> {
        Ok(json!({"chats_seen": self.chats_seen.load(Ordering::Relaxed)}))
    }
}

struct PingChannel;

#[async_trait]
impl ChannelHandler for PingChannel {
    async fn handle(&self, payload: Value) -> Result<Option<Value>, BoxError> {
        Ok(Some(json!({"pong": payload})))
    }
}

struct CheerAction;

#[async_trait]
impl ActionExecutor for CheerAction {
    async fn execute(&self, params: &Value, _ctx: &ActionContext) -> Result<Value, BoxError> {
        let who = params.get("who").and_then(Value::as_str).unwrap_or("someone");
        info!("🎉 Cheers for {who}!");
        Ok(json!({"cheered": who}))
    }
}

#[async_trait]
impl Extension for Greeter {
    async fn init(&self, caps: Arc<Capabilities>) -> Result<(), BoxError> {
        let chats_seen = Arc::clone(&self.chats_seen);
        caps.register_event(
            EventKind::Chat,
            handler_fn(move |event| {
                let chats_seen = Arc::clone(&chats_seen);
                async move {
                    if let LiveEvent::Chat(chat) = &*event {
                        chats_seen.fetch_add(1, Ordering::Relaxed);
                        info!("greeter saw chat from {}: {}", chat.actor.username, chat.message);
                    }
                    Ok(())
                }
            }),
        )?;

        caps.register_route(
            "GET",
            "stats",
            Arc::new(StatsRoute {
                chats_seen: Arc::clone(&self.chats_seen),
            }),
        )?;
        caps.register_channel("ping", Arc::new(PingChannel))?;

        caps.register_action(ActionDef {
            tag: "cheer".into(),
            label: "Cheer".into(),
            description: "Logs a celebratory message".into(),
            params_schema: json!({"who": {"type": "string"}}),
            executor: Arc::new(CheerAction),
        })?;

        caps.log("info", "greeter initialized");
        Ok(())
    }

    async fn teardown(&self) {
        info!("greeter shutting down");
    }
}

fn greeter_factory() -> ExtensionFactory {
    Arc::new(|_manifest| {
        Ok(Box::new(Greeter {
            chats_seen: Arc::new(AtomicU64::new(0)),
        }))
    })
}

// ============================================================================
// Scripted session
// ============================================================================

fn actor(id: &str, name: &str) -> Actor {
    Actor {
        user_id: id.into(),
        username: name.into(),
    }
}

fn session() -> Vec<LiveEvent> {
    vec![
        LiveEvent::Connected(ConnectionEvent {
            room_id: Some("demo-room".into()),
            timestamp: Utc::now(),
        }),
        LiveEvent::ViewerCount(ViewerCountEvent {
            viewers: 42,
            timestamp: Utc::now(),
        }),
        LiveEvent::Chat(ChatEvent {
            actor: actor("u1", "alice"),
            message: "hello!".into(),
            timestamp: Utc::now(),
        }),
        LiveEvent::Gift(GiftEvent {
            actor: actor("u2", "bob"),
            gift_name: "rose".into(),
            coins: 10,
            repeat_count: 1,
            timestamp: Utc::now(),
        }),
        LiveEvent::Gift(GiftEvent {
            actor: actor("u3", "carol"),
            gift_name: "rocket".into(),
            coins: 500,
            repeat_count: 1,
            timestamp: Utc::now(),
        }),
        LiveEvent::Chat(ChatEvent {
            actor: actor("u2", "bob"),
            message: "nice rocket".into(),
            timestamp: Utc::now(),
        }),
    ]
}

// ============================================================================
// Flows
// ============================================================================

fn big_gift_flow() -> FlowDraft {
    FlowDraft {
        name: "thank big gifts".into(),
        trigger: "gift".into(),
        trigger_params: Value::Null,
        condition: Some(ConditionNode::Leaf(ConditionLeaf {
            field: "coins".into(),
            operator: "gte".into(),
            value: json!(100),
        })),
        actions: vec![
            ActionSpec {
                action: "log".into(),
                params: json!({"message": "Thanks {username} for {coins} coins!"}),
            },
            ActionSpec {
                action: "set_variable".into(),
                params: json!({"name": "top_gifter", "value": "{username}"}),
            },
        ],
        enabled: true,
        on_error: ErrorPolicy::Abort,
    }
}

fn cheer_flow() -> FlowDraft {
    FlowDraft {
        name: "cheer every gift".into(),
        trigger: "gift".into(),
        trigger_params: Value::Null,
        condition: None,
        actions: vec![ActionSpec {
            action: "cheer".into(),
            params: json!({"who": "{username}"}),
        }],
        enabled: true,
        on_error: ErrorPolicy::Continue,
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = OvationRuntime::new()?;

    // The factory must exist before the manifest referencing it loads.
    runtime.register_factory("greeter", greeter_factory());
    seed_greeter_manifest(&runtime)?;

    runtime.register_source(Arc::new(ScriptedSource::new(session()))).await;

    // Flows persist through the settings store; only create them once.
    if runtime.engine().flows().is_empty() {
        runtime.engine().create_flow(big_gift_flow())?;
    }

    runtime.run_until(demo_sequence(&runtime)).await?;
    Ok(())
}

/// Writes the greeter's manifest into the extensions directory so discovery
/// picks it up like any externally installed extension.
fn seed_greeter_manifest(runtime: &OvationRuntime) -> Result<()> {
    let dir = runtime.config().extensions.dir.join("greeter");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join("manifest.json"),
        serde_json::to_string_pretty(&json!({
            "id": "greeter",
            "name": "Greeter",
            "version": "0.1.0",
            "description": "Counts chats, serves stats, cheers gifts",
            "entry": "greeter",
            "permissions": ["events", "routes", "channels", "config", "broadcast", "automation"],
        }))?,
    )?;
    Ok(())
}

/// Lets the scripted session play out, then creates the flow that uses the
/// extension-contributed action and triggers it manually.
async fn demo_sequence(runtime: &OvationRuntime) {
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    // The greeter contributed `cheer` during init; a flow can use it now.
    if !runtime.engine().flows().iter().any(|f| f.name == "cheer every gift") {
        if let Err(e) = runtime.engine().create_flow(cheer_flow()) {
            tracing::warn!(error = %e, "Could not create cheer flow");
        }
    }

    if let Some(flow) = runtime.engine().flows().iter().find(|f| f.name == "cheer every gift") {
        let _ = runtime
            .engine()
            .test_flow(flow.id, json!({"username": "the whole chat"}))
            .await;
    }

    info!(
        records = runtime.engine().history().len(),
        top_gifter = %runtime
            .engine()
            .variables()
            .get("top_gifter")
            .unwrap_or(json!("nobody")),
        "Demo session complete; Ctrl+C to exit"
    );

    // Keep serving the management API until interrupted.
    match tokio::signal::ctrl_c().await {
        Ok(()) => {}
        Err(e) => tracing::error!(error = %e, "Signal handler failed"),
    }
}
