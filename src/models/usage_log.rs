//! Audit entries recorded against the usage log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// One audited action within an org (upload, conversion, bundle creation).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UsageLog {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Tenant the action happened in.
    pub org_id: String,

    /// Acting user, when known.
    pub user_id: Option<String>,

    /// Action tag, e.g. `upload` or `convert_to_permanent`.
    pub action: String,

    /// Free-form action details.
    pub metadata: Json<serde_json::Value>,

    /// When the action was recorded.
    pub created_at: DateTime<Utc>,
}
