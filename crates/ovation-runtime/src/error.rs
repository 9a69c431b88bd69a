//! Runtime error types.

use thiserror::Error;

/// Errors that can occur during runtime orchestration.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// The settings store could not be opened.
    #[error(transparent)]
    Settings(#[from] ovation_core::SettingsError),

    /// Extension host setup or lifecycle failed.
    #[error(transparent)]
    Extension(#[from] ovation_extension::ExtensionError),

    /// Flow engine setup failed.
    #[error(transparent)]
    Flow(#[from] ovation_flow::FlowError),

    /// Filesystem error while preparing data directories.
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called twice on the same runtime.
    #[error("runtime is already running")]
    AlreadyStarted,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
