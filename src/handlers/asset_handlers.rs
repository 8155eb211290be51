//! HTTP handlers for asset ingest, listing, signed object reads, and
//! variant generation. Storage and catalog concerns stay behind the
//! services; handlers only translate the wire.

use crate::{
    errors::AppError,
    models::asset::SourceClass,
    services::metadata_store::NewAsset,
    services::variant_service::VariantRequest,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Query params for `GET /api/assets`.
#[derive(Debug, Deserialize)]
pub struct ListAssetsQuery {
    pub org: String,
    pub limit: Option<i64>,
}

/// Query params carried by a signed object read URL.
#[derive(Debug, Deserialize)]
pub struct SignedReadQuery {
    pub expires: i64,
    pub sig: String,
}

/// Request body for `POST /api/variants`.
#[derive(Debug, Deserialize)]
pub struct VariantReq {
    pub path: String,
    #[serde(default = "default_true")]
    pub generate_full: bool,
    #[serde(default = "default_true")]
    pub generate_thumbs: bool,
}

fn default_true() -> bool {
    true
}

/// `POST /api/assets` — ingest an original upload.
///
/// Multipart form: `org`, `path`, `file`, optional `source_class` and
/// `expires_at` (RFC 3339). The object lands in storage, the record is
/// inserted, and an `upload` audit entry is appended.
pub async fn ingest_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut org: Option<String> = None;
    let mut path: Option<String> = None;
    let mut source_class = SourceClass::Cloud;
    let mut expires_at: Option<DateTime<Utc>> = None;
    let mut file: Option<(Bytes, Option<String>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "org" => org = Some(read_text(field).await?),
            "path" => path = Some(read_text(field).await?),
            "source_class" => {
                source_class = parse_source_class(&read_text(field).await?)?;
            }
            "expires_at" => {
                let raw = read_text(field).await?;
                let parsed = DateTime::parse_from_rfc3339(&raw).map_err(|err| {
                    AppError::bad_request(format!("invalid expires_at `{}`: {}", raw, err))
                })?;
                expires_at = Some(parsed.with_timezone(&Utc));
            }
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                file = Some((bytes, content_type));
            }
            _ => {}
        }
    }

    let org = org.ok_or_else(|| AppError::bad_request("org field is required"))?;
    let path = path.ok_or_else(|| AppError::bad_request("path field is required"))?;
    let (bytes, content_type) =
        file.ok_or_else(|| AppError::bad_request("file field is required"))?;

    // Storage paths are namespaced by org scope.
    if !path.starts_with(&format!("{}/", org)) {
        return Err(AppError::bad_request(format!(
            "path must be scoped under `{}/`",
            org
        )));
    }
    // event_temp uploads carry an expiry; permanent classes never do.
    match source_class {
        SourceClass::EventTemp if expires_at.is_none() => {
            return Err(AppError::bad_request(
                "expires_at is required for event_temp uploads",
            ));
        }
        SourceClass::EventTemp => {}
        _ => expires_at = None,
    }

    let size_bytes = bytes.len() as i64;
    let etag = state.objects.upload(&path, bytes).await?;
    let asset = state
        .catalog
        .insert_asset(NewAsset {
            org_id: org.clone(),
            full_path: path.clone(),
            source_class,
            size_bytes,
            etag: Some(etag),
            content_type,
            expires_at,
        })
        .await?;

    if let Err(err) = state
        .catalog
        .log_usage(
            &org,
            None,
            "upload",
            json!({ "path": path, "size_bytes": size_bytes }),
        )
        .await
    {
        warn!("failed to record upload audit entry: {}", err);
    }

    Ok((StatusCode::CREATED, Json(asset)))
}

/// `GET /api/assets?org=&limit=` — active assets, newest first.
pub async fn list_assets(
    State(state): State<AppState>,
    Query(q): Query<ListAssetsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let assets = state.catalog.list_assets(&q.org, limit).await?;
    Ok(Json(assets))
}

/// `GET /objects/{*path}?expires=&sig=` — stream object bytes behind a
/// signed read URL.
pub async fn serve_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(q): Query<SignedReadQuery>,
) -> Result<Response, AppError> {
    if !state.signer.verify(&path, q.expires, &q.sig) {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "invalid or expired signature",
        ));
    }

    let bytes = state.objects.download(&path).await?;
    let len = bytes.len();
    let stream = ReaderStream::new(Cursor::new(bytes));

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&path)),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    Ok(response)
}

/// `POST /api/variants` — generate serving renditions for an original.
pub async fn generate_variants(
    State(state): State<AppState>,
    Json(req): Json<VariantReq>,
) -> Result<impl IntoResponse, AppError> {
    let set = state
        .variants
        .generate(VariantRequest {
            path: req.path,
            generate_full: req.generate_full,
            generate_thumbs: req.generate_thumbs,
        })
        .await?;
    Ok(Json(set))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))
}

fn parse_source_class(raw: &str) -> Result<SourceClass, AppError> {
    match raw {
        "cloud" => Ok(SourceClass::Cloud),
        "local_sync" => Ok(SourceClass::LocalSync),
        "event_temp" => Ok(SourceClass::EventTemp),
        other => Err(AppError::bad_request(format!(
            "unknown source_class `{}`",
            other
        ))),
    }
}

/// Content type guess for a logical object path.
fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
