//! # Ovation Flow
//!
//! The automation engine: user-defined trigger→condition→action flows
//! evaluated over the live event stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   handle_event   ┌────────────┐   lookup   ┌────────────┐
//! │ EventBus │─────────────────▶│ FlowEngine │◀──────────▶│ Registries │
//! └──────────┘                  │            │            │ (trigger / │
//!        ┌──────────┐    fire   │  condition │            │  operator/ │
//!        │ Timers   │──────────▶│  + actions │            │  action)   │
//!        └──────────┘           └─────┬──────┘            └────────────┘
//!                                     │ records
//!                               ┌─────▼──────┐  ┌───────────────┐
//!                               │  History   │  │ VariableStore │
//!                               └────────────┘  └───────────────┘
//! ```
//!
//! Registries start with built-in entries and accept extension
//! contributions; the engine resolves every tag through the registry with
//! no special-casing by origin. Timer-triggered flows run on their own
//! schedule, independent of the event stream.

pub mod builtin;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;
pub mod operator;
pub mod registry;
pub mod template;
pub mod timer;
pub mod variables;

pub use builtin::TIMER_TRIGGER;
pub use engine::FlowEngine;
pub use error::{ConditionError, FlowError, FlowResult};
pub use history::{
    ActionOutcome, ActionResult, ExecutionHistory, ExecutionOrigin, ExecutionRecord, RunOutcome,
};
pub use model::{ActionSpec, ConditionLeaf, ConditionNode, ErrorPolicy, Flow, FlowDraft, GroupOp};
pub use operator::ConditionOperator;
pub use registry::{
    ActionContext, ActionDef, ActionExecutor, Broadcaster, DefinitionCatalog, DefinitionSummary,
    OperatorDef, Registries, Registry, TriggerDef, TriggerMatcher,
};
pub use timer::TimerService;
pub use variables::{Variable, VariableStore};
