//! HTTP handlers for the trash lifecycle and event-temp conversion.

use crate::{errors::AppError, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Request body for `POST /api/trash` (soft delete).
#[derive(Debug, Deserialize)]
pub struct TrashReq {
    pub asset_id: Uuid,
    pub org: String,
}

/// Request body for `PUT /api/trash` (restore).
#[derive(Debug, Deserialize)]
pub struct RestoreReq {
    pub asset_id: Uuid,
}

/// Query params for `DELETE /api/trash`.
#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub asset_id: Uuid,
}

/// Query params for org-scoped trash and conversion endpoints.
#[derive(Debug, Deserialize)]
pub struct OrgQuery {
    pub org: String,
}

/// Request body for `POST /api/convert-permanent`.
#[derive(Debug, Deserialize)]
pub struct ConvertReq {
    pub org: String,
    #[serde(default)]
    pub asset_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub convert_all: bool,
}

/// `POST /api/trash` — move an asset to the org's trash area.
pub async fn trash_asset(
    State(state): State<AppState>,
    Json(req): Json<TrashReq>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state.trash.soft_delete(req.asset_id, &req.org).await?;
    Ok(Json(receipt))
}

/// `PUT /api/trash` — restore a trashed asset to its pre-trash path.
pub async fn restore_asset(
    State(state): State<AppState>,
    Json(req): Json<RestoreReq>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state.trash.restore(req.asset_id).await?;
    Ok(Json(receipt))
}

/// `DELETE /api/trash?asset_id=` — permanently delete a trashed asset.
/// Refuses assets that are not in the trash.
pub async fn purge_asset(
    State(state): State<AppState>,
    Query(q): Query<PurgeQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.trash.permanent_delete(q.asset_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/trash?org=` — trashed assets with retention countdowns.
pub async fn list_trash(
    State(state): State<AppState>,
    Query(q): Query<OrgQuery>,
) -> Result<impl IntoResponse, AppError> {
    let entries = state.trash.list_trash(&q.org).await?;
    Ok(Json(json!({
        "count": entries.len(),
        "assets": entries,
    })))
}

/// `POST /api/convert-permanent` — convert event_temp assets to permanent
/// cloud storage. Converts the whole org when `convert_all` is set or no
/// explicit ids are given.
pub async fn convert_to_permanent(
    State(state): State<AppState>,
    Json(req): Json<ConvertReq>,
) -> Result<impl IntoResponse, AppError> {
    let ids = if req.convert_all {
        None
    } else {
        req.asset_ids.filter(|ids| !ids.is_empty())
    };
    let converted = state
        .catalog
        .convert_event_temp(&req.org, ids.as_deref())
        .await?;
    Ok(Json(json!({ "converted_count": converted })))
}

/// `GET /api/convert-permanent?org=` — count of assets still awaiting
/// conversion.
pub async fn event_temp_count(
    State(state): State<AppState>,
    Query(q): Query<OrgQuery>,
) -> Result<impl IntoResponse, AppError> {
    let count = state.catalog.count_event_temp(&q.org).await?;
    Ok(Json(json!({ "event_temp_count": count })))
}
