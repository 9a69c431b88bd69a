//! API error envelope.
//!
//! Every user-visible failure becomes a structured JSON payload
//! `{"error": {"kind": ..., "message": ...}}` with a matching status code.
//! Internal failures are logged with context before being flattened to a
//! generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use ovation_extension::{CapabilityError, ExtensionError};
use ovation_flow::FlowError;

/// Errors surfaced by the management API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            error!(error = %self, "API request failed");
        }
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<ExtensionError> for ApiError {
    fn from(e: ExtensionError) -> Self {
        match e {
            ExtensionError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ExtensionError::DuplicateId(_)
            | ExtensionError::InvalidState { .. }
            | ExtensionError::Dependency { .. } => ApiError::Conflict(e.to_string()),
            ExtensionError::Manifest(_)
            | ExtensionError::Upload(_)
            | ExtensionError::UnknownEntry(_) => ApiError::BadRequest(e.to_string()),
            ExtensionError::Init { .. } => ApiError::Conflict(e.to_string()),
            ExtensionError::Io(_) | ExtensionError::State(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        match e {
            FlowError::NotFound(_) => ApiError::NotFound(e.to_string()),
            FlowError::UnknownTrigger(_) => ApiError::BadRequest(e.to_string()),
            FlowError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CapabilityError> for ApiError {
    fn from(e: CapabilityError) -> Self {
        match e {
            CapabilityError::PermissionDenied { .. } => ApiError::Conflict(e.to_string()),
            CapabilityError::Settings(_) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Result alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
