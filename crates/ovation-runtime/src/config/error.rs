//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Extraction or merge failure from figment (bad TOML, wrong types,
    /// invalid env values).
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// The explicitly requested config file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
