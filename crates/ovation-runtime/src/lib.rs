//! # Ovation Runtime
//!
//! Orchestration layer for the Ovation live-event companion: configuration
//! loading, logging setup, and the [`OvationRuntime`] that wires the event
//! pipeline, extension host, automation engine, and management server
//! together.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigLoader, OvationConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{OvationRuntime, RuntimeBuilder};
