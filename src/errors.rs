use crate::services::metadata_store::CatalogError;
use crate::services::object_store::ObjectStoreError;
use crate::services::trash_service::TrashError;
use crate::services::variant_service::VariantError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 409 Conflict
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<ObjectStoreError> for AppError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(_) => AppError::not_found(err.to_string()),
            ObjectStoreError::InvalidPath => AppError::bad_request(err.to_string()),
            ObjectStoreError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::AssetNotFound(_) | CatalogError::BundleNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            CatalogError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<TrashError> for AppError {
    fn from(err: TrashError) -> Self {
        let message = err.to_string();
        match err {
            TrashError::Catalog(inner) => inner.into(),
            TrashError::MissingOriginalPath(_) | TrashError::State(_) => {
                AppError::conflict(message)
            }
            TrashError::CopyFailed { .. } => AppError::internal(message),
        }
    }
}

impl From<VariantError> for AppError {
    fn from(err: VariantError) -> Self {
        let message = err.to_string();
        match err {
            VariantError::SourceMissing(_) => AppError::not_found(message),
            VariantError::Image(_) => AppError::bad_request(message),
            VariantError::UploadFailed { .. }
            | VariantError::Render(_)
            | VariantError::Store(_) => AppError::internal(message),
        }
    }
}
