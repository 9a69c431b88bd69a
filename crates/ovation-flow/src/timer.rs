//! Timer subsystem.
//!
//! Flows with the `timer` trigger are driven on their own schedule,
//! independent of the live event stream: one background task per enabled
//! timer flow, each owning a cancellation token. [`TimerService::sync`]
//! reconciles the task set against the engine's current flow list — callers
//! invoke it after every flow create/update/delete/toggle, so disabling or
//! deleting a flow cancels its pending timer immediately (no leaked timers).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::FlowEngine;
use crate::error::FlowError;
use crate::history::ExecutionOrigin;

struct TimerTask {
    interval_secs: u64,
    token: CancellationToken,
}

/// Owns the background tasks for timer-triggered flows.
pub struct TimerService {
    engine: Arc<FlowEngine>,
    tasks: Mutex<HashMap<Uuid, TimerTask>>,
}

impl TimerService {
    pub fn new(engine: Arc<FlowEngine>) -> Self {
        Self {
            engine,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles running timers with the engine's enabled timer flows:
    /// cancels timers whose flow is gone, disabled, or rescheduled, and
    /// starts timers for newly enabled flows.
    pub fn sync(&self) {
        let desired: HashMap<Uuid, u64> = self.engine.timer_flows().into_iter().collect();
        let mut tasks = self.tasks.lock();

        tasks.retain(|flow_id, task| {
            let keep = desired.get(flow_id) == Some(&task.interval_secs);
            if !keep {
                debug!(flow_id = %flow_id, "Cancelling flow timer");
                task.token.cancel();
            }
            keep
        });

        for (flow_id, interval_secs) in desired {
            if tasks.contains_key(&flow_id) {
                continue;
            }
            let token = CancellationToken::new();
            tasks.insert(
                flow_id,
                TimerTask {
                    interval_secs,
                    token: token.clone(),
                },
            );
            debug!(flow_id = %flow_id, interval_secs, "Starting flow timer");
            tokio::spawn(run_timer(
                Arc::clone(&self.engine),
                flow_id,
                interval_secs,
                token,
            ));
        }
    }

    /// Number of live timer tasks.
    pub fn active(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancels every timer. Called on runtime shutdown.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for (_, task) in tasks.drain() {
            task.token.cancel();
        }
    }
}

async fn run_timer(
    engine: Arc<FlowEngine>,
    flow_id: Uuid,
    interval_secs: u64,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so the first fire
    // happens one full interval after scheduling.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let payload = json!({
                    "type": "timer",
                    "flow_id": flow_id,
                    "timestamp": chrono::Utc::now(),
                });
                match engine.run_flow(flow_id, payload, ExecutionOrigin::Timer).await {
                    Ok(_) => {}
                    Err(FlowError::NotFound(_)) => {
                        // Deleted between sync calls; stop firing.
                        break;
                    }
                    Err(e) => {
                        warn!(flow_id = %flow_id, error = %e, "Timer flow execution failed");
                    }
                }
            }
        }
    }
    debug!(flow_id = %flow_id, "Flow timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::model::{ActionSpec, ErrorPolicy, FlowDraft};
    use crate::registry::Registries;
    use crate::variables::VariableStore;
    use serde_json::{Value, json};

    fn engine() -> Arc<FlowEngine> {
        let registries = Arc::new(Registries::new());
        builtin::install(&registries);
        Arc::new(FlowEngine::new(
            registries,
            Arc::new(VariableStore::new()),
            16,
        ))
    }

    fn timer_flow(interval_secs: u64) -> FlowDraft {
        FlowDraft {
            name: "tick".into(),
            trigger: "timer".into(),
            trigger_params: json!({"interval_secs": interval_secs}),
            condition: None,
            actions: vec![ActionSpec {
                action: "set_variable".into(),
                params: json!({"name": "ticked", "value": true}),
            }],
            enabled: true,
            on_error: ErrorPolicy::Abort,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_on_schedule() {
        let engine = engine();
        engine.create_flow(timer_flow(10)).unwrap();

        let timers = TimerService::new(Arc::clone(&engine));
        timers.sync();
        assert_eq!(timers.active(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(engine.variables().get("ticked"), Some(Value::Bool(true)));
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_cancels_the_timer() {
        let engine = engine();
        let flow = engine.create_flow(timer_flow(10)).unwrap();

        let timers = TimerService::new(Arc::clone(&engine));
        timers.sync();
        assert_eq!(timers.active(), 1);

        engine.set_enabled(flow.id, false).unwrap();
        timers.sync();
        assert_eq!(timers.active(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert!(engine.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_task() {
        let engine = engine();
        let flow = engine.create_flow(timer_flow(10)).unwrap();

        let timers = TimerService::new(Arc::clone(&engine));
        timers.sync();

        let mut draft = timer_flow(99);
        draft.name = "tick".into();
        engine.update_flow(flow.id, draft).unwrap();
        timers.sync();

        assert_eq!(timers.active(), 1);
        // Old 10s cadence must be gone.
        tokio::time::sleep(Duration::from_secs(15)).await;
        tokio::task::yield_now().await;
        assert!(engine.history().is_empty());
    }
}
