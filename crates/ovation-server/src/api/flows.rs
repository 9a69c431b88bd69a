//! Flow CRUD endpoints.
//!
//! Every mutation resynchronizes the timer subsystem so disabling or
//! deleting a timer flow cancels its pending timer immediately.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use uuid::Uuid;

use ovation_flow::{ExecutionRecord, Flow, FlowDraft};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /api/flows`
pub async fn list(State(state): State<AppState>) -> Json<Vec<Flow>> {
    Json(state.engine.flows())
}

/// `POST /api/flows`
pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<FlowDraft>,
) -> ApiResult<Json<Flow>> {
    let flow = state.engine.create_flow(draft)?;
    state.timers.sync();
    Ok(Json(flow))
}

/// `GET /api/flows/{id}`
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Flow>> {
    state
        .engine
        .flow(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("flow not found: {id}")))
}

/// `PUT /api/flows/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<FlowDraft>,
) -> ApiResult<Json<Flow>> {
    let flow = state.engine.update_flow(id, draft)?;
    state.timers.sync();
    Ok(Json(flow))
}

/// `DELETE /api/flows/{id}` — history for the flow remains queryable.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.engine.delete_flow(id)?;
    state.timers.sync();
    Ok(Json(json!({"deleted": true})))
}

/// `POST /api/flows/{id}/toggle`
pub async fn toggle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Flow>> {
    let current = state
        .engine
        .flow(id)
        .ok_or_else(|| ApiError::NotFound(format!("flow not found: {id}")))?;
    let flow = state.engine.set_enabled(id, !current.enabled)?;
    state.timers.sync();
    Ok(Json(flow))
}

/// `POST /api/flows/{id}/test` — runs the action list directly against the
/// supplied sample data, bypassing trigger match and conditions.
pub async fn test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(sample): Json<Value>,
) -> ApiResult<Json<ExecutionRecord>> {
    let record = state.engine.test_flow(id, sample).await?;
    Ok(Json(record))
}
