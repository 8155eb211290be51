//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> readiness probing the catalog and the object store

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    catalog: CheckStatus,
    storage: CheckStatus,
}

/// `GET /healthz` — cheap liveness probe, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// Readiness goes through the same seams the handlers use: a catalog ping
/// and a write/read/remove round trip against the object store. HTTP 200
/// when both pass, 503 otherwise; the body reports each check.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = match state.catalog.ping().await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(err.to_string()),
        },
    };

    let storage = storage_round_trip(&state).await;

    let ok = catalog.ok && storage.ok;
    let body = ReadyResponse {
        status: if ok { "ok" } else { "error" },
        catalog,
        storage,
    };
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Write, read back, and remove a probe object under a reserved prefix.
async fn storage_round_trip(state: &AppState) -> CheckStatus {
    let probe_path = format!(".probe/readyz-{}", Uuid::new_v4());
    if let Err(err) = state
        .objects
        .upload(&probe_path, Bytes::from_static(b"readyz"))
        .await
    {
        return CheckStatus {
            ok: false,
            error: Some(format!("probe write failed: {}", err)),
        };
    }

    let check = match state.objects.download(&probe_path).await {
        Ok(bytes) if bytes == b"readyz"[..] => CheckStatus {
            ok: true,
            error: None,
        },
        Ok(_) => CheckStatus {
            ok: false,
            error: Some("probe content mismatch".to_string()),
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(format!("probe read failed: {}", err)),
        },
    };

    if let Err(err) = state.objects.remove(&probe_path).await {
        tracing::debug!("failed to remove readiness probe {}: {}", probe_path, err);
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::{MemoryObjectStore, UrlSigner};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn test_state() -> (AppState, Arc<MemoryObjectStore>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let state = AppState::new(
            Arc::new(pool),
            store.clone(),
            UrlSigner::new("probe-secret"),
        );
        (state, store)
    }

    #[tokio::test]
    async fn readyz_passes_with_working_backends() {
        let (state, _store) = test_state().await;
        let response = readyz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_probe_cleans_up_after_itself() {
        let (state, store) = test_state().await;
        let _ = readyz(State(state)).await.into_response();
        assert!(store.is_empty());
    }
}
