//! Configuration loading and schema.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    AutomationConfig, EventsConfig, ExtensionsConfig, LogFormat, LogLevel, LogOutput,
    LoggingConfig, OvationConfig, ServerConfig,
};
