//! Extension runtime error types.
//!
//! Every failure is contained at its origin boundary: a manifest that fails
//! to parse is skipped, a failing initialization hook marks only that
//! extension as errored, an invalid upload is rejected before any write to
//! the extensions directory. None of these may terminate the host.

use thiserror::Error;

use ovation_core::BoxError;

/// Errors from the extension runtime.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The manifest is missing required fields or fails validation.
    /// Discovery skips the extension and logs the cause.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// No extension with this id is registered.
    #[error("extension not found: '{0}'")]
    NotFound(String),

    /// A manifest declares an id that is already registered. The first
    /// registration stays; the duplicate is rejected.
    #[error("duplicate extension id: '{0}'")]
    DuplicateId(String),

    /// A declared dependency has not reached the active state.
    #[error("extension '{id}' depends on '{dependency}', which is not active")]
    Dependency { id: String, dependency: String },

    /// The manifest `entry` names a factory the host does not know.
    #[error("no factory registered for entry '{0}'")]
    UnknownEntry(String),

    /// The extension's initialization hook failed. The instance is marked
    /// errored; other extensions are unaffected.
    #[error("extension '{id}' failed to initialize: {source}")]
    Init {
        id: String,
        #[source]
        source: BoxError,
    },

    /// The operation is not valid in the extension's current state.
    #[error("extension '{id}' is {state}, expected {expected}")]
    InvalidState {
        id: String,
        state: &'static str,
        expected: &'static str,
    },

    /// An uploaded package failed validation. Rejected before any
    /// filesystem mutation outside the staging area.
    #[error("upload rejected: {0}")]
    Upload(String),

    /// Filesystem error while discovering, installing, or deleting.
    #[error("extension I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted extension state file could not be read or written.
    #[error("extension state file error: {0}")]
    State(#[source] serde_json::Error),
}

/// Result type for extension runtime operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
