//! Automation introspection endpoints: definitions, history, variables,
//! manual triggering, and test event injection.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use ovation_core::LiveEvent;
use ovation_flow::{DefinitionCatalog, ExecutionOrigin, ExecutionRecord, Variable};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /api/automation/definitions` — every trigger/operator/action
/// definition, built-in and extension-contributed alike.
pub async fn definitions(State(state): State<AppState>) -> Json<DefinitionCatalog> {
    Json(state.engine.registries().catalog())
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// `GET /api/automation/history`
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ExecutionRecord>> {
    Json(state.engine.history().recent(query.limit))
}

/// `GET /api/automation/variables`
pub async fn variables(State(state): State<AppState>) -> Json<HashMap<String, Variable>> {
    Json(state.engine.variables().list())
}

#[derive(Deserialize)]
pub struct SetVariableBody {
    pub value: Value,
}

/// `PUT /api/automation/variables/{name}`
pub async fn set_variable(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<SetVariableBody>,
) -> Json<Value> {
    state.engine.variables().set(&name, body.value);
    Json(json!({"name": name}))
}

/// `DELETE /api/automation/variables/{name}`
pub async fn delete_variable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    if state.engine.variables().delete(&name) {
        Ok(Json(json!({"deleted": true})))
    } else {
        Err(ApiError::NotFound(format!("variable not found: '{name}'")))
    }
}

/// `POST /api/automation/flows/{id}/trigger` — runs a flow against a
/// synthetic empty payload. The condition tree still applies; the response
/// reports whether it matched.
pub async fn trigger_flow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let record = state
        .engine
        .run_flow(id, json!({}), ExecutionOrigin::Manual)
        .await?;
    Ok(Json(json!({
        "matched": record.is_some(),
        "record": record,
    })))
}

/// `POST /api/automation/events` — injects a typed event into the dispatch
/// pipeline, exactly as if the source had emitted it.
pub async fn inject_event(
    State(state): State<AppState>,
    Json(event): Json<LiveEvent>,
) -> ApiResult<StatusCode> {
    state
        .sink
        .send(event)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}
