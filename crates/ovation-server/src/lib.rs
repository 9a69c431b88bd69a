//! # Ovation Server
//!
//! HTTP and WebSocket surface of the companion:
//!
//! - the management API (extensions, flows, automation introspection),
//! - dispatch of extension-registered routes under `/ext/{id}/…`, backed by
//!   the removable route table,
//! - the channel hub transport at `/ws`.
//!
//! Every user-visible failure is a structured JSON error; extension handler
//! failures are contained at this boundary and never reach the host.

pub mod api;
pub mod error;
pub mod ext_routes;
pub mod server;
pub mod state;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use server::{router, serve};
pub use state::AppState;
