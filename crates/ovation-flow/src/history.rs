//! Execution history.
//!
//! Every executed flow run is recorded as an [`ExecutionRecord`] in a
//! bounded ring buffer: inserting past capacity evicts the oldest record.
//! Disabling or deleting a flow never erases its recorded history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What started a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOrigin {
    /// Matched a live event.
    Event,
    /// Fired by the timer subsystem.
    Timer,
    /// Triggered by an operator through the API.
    Manual,
    /// Test execution with caller-supplied sample data.
    Test,
}

/// Result of one action within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Ok {
        #[serde(default)]
        output: Value,
    },
    Error {
        message: String,
    },
}

/// One action's outcome, with the parameters as actually rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: String,
    pub params: Value,
    #[serde(flatten)]
    pub result: ActionResult,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every action succeeded.
    Completed,
    /// At least one action failed under the `continue` policy.
    CompletedWithErrors,
    /// An action failed under the `abort` policy; the rest were skipped.
    Aborted,
}

/// Audit entry for one flow execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub flow_name: String,
    pub trigger: String,
    pub origin: ExecutionOrigin,
    /// Snapshot of the event payload the run was evaluated against.
    pub event: Value,
    pub actions: Vec<ActionOutcome>,
    pub outcome: RunOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Bounded ring buffer of execution records.
pub struct ExecutionHistory {
    capacity: usize,
    records: RwLock<VecDeque<ExecutionRecord>>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Appends a record, evicting the oldest when at capacity.
    pub fn push(&self, record: ExecutionRecord) {
        let mut records = self.records.write();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// The most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Records for one flow, newest first.
    pub fn for_flow(&self, flow_id: Uuid, limit: usize) -> Vec<ExecutionRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .filter(|r| r.flow_id == flow_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: u64) -> ExecutionRecord {
        ExecutionRecord {
            id: Uuid::new_v4(),
            flow_id: Uuid::nil(),
            flow_name: format!("flow-{n}"),
            trigger: "gift".into(),
            origin: ExecutionOrigin::Event,
            event: json!({"n": n}),
            actions: vec![],
            outcome: RunOutcome::Completed,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let history = ExecutionHistory::new(3);
        for n in 0..4 {
            history.push(record(n));
        }
        assert_eq!(history.len(), 3);
        let recent = history.recent(10);
        // Newest first; record 0 was evicted.
        assert_eq!(recent[0].event["n"], 3);
        assert_eq!(recent[2].event["n"], 1);
    }

    #[test]
    fn recent_respects_limit() {
        let history = ExecutionHistory::new(10);
        for n in 0..5 {
            history.push(record(n));
        }
        assert_eq!(history.recent(2).len(), 2);
    }
}
