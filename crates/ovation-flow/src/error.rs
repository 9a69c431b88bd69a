//! Automation engine error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while evaluating a condition leaf.
///
/// The engine never lets these escape an evaluation: a failing leaf is
/// logged and treated as a non-match.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// The leaf names an operator no registry entry provides.
    #[error("unknown condition operator: '{0}'")]
    UnknownOperator(String),

    /// The operator cannot be applied to the operand types it was given.
    #[error("operator '{operator}' cannot compare {actual}")]
    TypeMismatch { operator: String, actual: String },
}

/// Errors from flow management operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// No flow with the given id.
    #[error("flow not found: {0}")]
    NotFound(Uuid),

    /// The flow references a trigger no registry entry provides.
    #[error("unknown trigger type: '{0}'")]
    UnknownTrigger(String),

    /// Persisting the flow list failed.
    #[error("flow storage error: {0}")]
    Storage(#[from] ovation_core::SettingsError),
}

/// Result type for flow management operations.
pub type FlowResult<T> = Result<T, FlowError>;
