//! Defines routes for the asset lifecycle API.
//!
//! ## Structure
//! - **Asset endpoints**
//!   - `POST   /api/assets` — ingest an original upload (multipart)
//!   - `GET    /api/assets` — list active assets for an org
//!   - `POST   /api/variants` — generate serving renditions
//!   - `GET    /objects/{*path}` — signed-read streaming of object bytes
//!
//! - **Trash lifecycle endpoints**
//!   - `POST   /api/trash` — soft delete
//!   - `PUT    /api/trash` — restore
//!   - `DELETE /api/trash` — permanent delete (trashed assets only)
//!   - `GET    /api/trash` — trash listing with retention countdowns
//!   - `POST   /api/convert-permanent` — event_temp -> cloud conversion
//!   - `GET    /api/convert-permanent` — pending conversion count
//!
//! - **Bundle endpoints**
//!   - `POST   /api/bundles` — create a shareable bundle
//!   - `GET    /api/bundles/{id}` — bundle with signed member URLs
//!
//! The wildcard `*path` allows nested keys like `acme/2025/originals/img.jpg`.

use crate::{
    handlers::{
        asset_handlers::{generate_variants, ingest_asset, list_assets, serve_object},
        bundle_handlers::{create_bundle, get_bundle},
        health_handlers::{healthz, readyz},
        trash_handlers::{
            convert_to_permanent, event_temp_count, list_trash, purge_asset, restore_asset,
            trash_asset,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the whole API surface.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Asset endpoints
        .route("/api/assets", post(ingest_asset).get(list_assets))
        .route("/api/variants", post(generate_variants))
        .route("/objects/{*path}", get(serve_object))
        // Trash lifecycle endpoints
        .route(
            "/api/trash",
            post(trash_asset)
                .put(restore_asset)
                .delete(purge_asset)
                .get(list_trash),
        )
        .route(
            "/api/convert-permanent",
            post(convert_to_permanent).get(event_temp_count),
        )
        // Bundle endpoints
        .route("/api/bundles", post(create_bundle))
        .route("/api/bundles/{id}", get(get_bundle))
}
