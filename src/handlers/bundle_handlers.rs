//! HTTP handlers for shareable bundles.

use crate::{errors::AppError, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Signed bundle-member URLs stay valid for an hour.
const BUNDLE_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Request body for `POST /api/bundles`.
#[derive(Debug, Deserialize)]
pub struct CreateBundleReq {
    pub org: String,
    pub name: String,
    pub asset_ids: Vec<Uuid>,
}

/// `POST /api/bundles` — create a shareable bundle over a set of assets.
pub async fn create_bundle(
    State(state): State<AppState>,
    Json(req): Json<CreateBundleReq>,
) -> Result<impl IntoResponse, AppError> {
    if req.asset_ids.is_empty() {
        return Err(AppError::bad_request("asset_ids must not be empty"));
    }

    let bundle = state
        .catalog
        .create_bundle(&req.org, &req.name, &req.asset_ids)
        .await?;

    if let Err(err) = state
        .catalog
        .log_usage(
            &req.org,
            None,
            "bundle_create",
            json!({ "name": req.name, "photo_count": req.asset_ids.len() }),
        )
        .await
    {
        warn!("failed to record bundle audit entry: {}", err);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": bundle.id, "url": bundle.url() })),
    ))
}

/// `GET /api/bundles/{id}` — bundle metadata plus its member assets with
/// signed read URLs.
pub async fn get_bundle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let bundle = state.catalog.fetch_bundle(id).await?;
    let assets = state.catalog.fetch_existing_assets(&bundle.asset_ids).await?;

    let photos: Vec<_> = assets
        .iter()
        .map(|asset| {
            json!({
                "id": asset.id,
                "path": asset.full_path,
                "url": state.objects.signed_read_url(&asset.full_path, BUNDLE_URL_TTL),
            })
        })
        .collect();

    Ok(Json(json!({
        "bundle": {
            "id": bundle.id,
            "name": bundle.name,
            "created_at": bundle.created_at,
            "photos": photos,
        }
    })))
}
