//! Extension route dispatch.
//!
//! Requests under `/ext/{extension-id}/...` are resolved through the
//! removable [`RouteTable`]. A handler failure is converted into a
//! structured error response at this boundary; it never propagates to the
//! host, and other routes keep serving.

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::warn;

use ovation_extension::{RouteError, RouteRequest};

use crate::state::AppState;

/// Handles any method under `/ext/{id}/{*rest}`.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    Path((id, rest)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let body = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    &format!("request body is not valid JSON: {e}"),
                );
            }
        }
    };

    let request = RouteRequest {
        method: method.to_string(),
        path: format!("/{id}/{rest}"),
        query,
        body,
    };

    match state.routes.dispatch(request).await {
        Ok(data) => Json(json!({"success": true, "data": data})).into_response(),
        Err(RouteError::NotFound { method, path }) => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("no route for {method} {path}"),
        ),
        Err(RouteError::Handler { extension, message }) => {
            warn!(extension = %extension, error = %message, "Extension route handler failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "extension_error",
                &message,
            )
        }
    }
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": {"kind": kind, "message": message},
        })),
    )
        .into_response()
}
