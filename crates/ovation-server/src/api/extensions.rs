//! Extension management endpoints.

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use ovation_extension::{ExtensionInfo, LogEntry};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /api/extensions`
pub async fn list(State(state): State<AppState>) -> Json<Vec<ExtensionInfo>> {
    Json(state.host.list().await)
}

/// `GET /api/extensions/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExtensionInfo>> {
    state
        .host
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("extension not found: '{id}'")))
}

/// `POST /api/extensions` — multipart upload of a packaged extension.
///
/// The package is validated in a staging area before anything lands in the
/// extensions directory; a rejected upload leaves no partial state.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ExtensionInfo>> {
    let mut package: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        package = Some(bytes.to_vec());
        break;
    }
    let package =
        package.ok_or_else(|| ApiError::BadRequest("upload contains no package field".into()))?;

    let info = state.host.install(package).await?;
    Ok(Json(info))
}

/// `POST /api/extensions/{id}/enable`
pub async fn enable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.host.enable(&id).await?;
    Ok(Json(json!({"enabled": true})))
}

/// `POST /api/extensions/{id}/disable`
pub async fn disable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.host.disable(&id).await?;
    Ok(Json(json!({"enabled": false})))
}

/// `POST /api/extensions/{id}/reload`
pub async fn reload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExtensionInfo>> {
    state.host.reload(&id).await?;
    state
        .host
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("extension not found: '{id}'")))
}

/// `POST /api/extensions/reload` — reload every active extension.
pub async fn reload_all(State(state): State<AppState>) -> Json<Vec<ExtensionInfo>> {
    state.host.reload_all().await;
    Json(state.host.list().await)
}

/// `DELETE /api/extensions/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.host.delete(&id).await?;
    Ok(Json(json!({"deleted": true})))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

fn default_log_limit() -> usize {
    100
}

/// `GET /api/extensions/{id}/logs`
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    Ok(Json(state.host.logs(&id, query.limit).await?))
}
