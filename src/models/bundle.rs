//! A named, shareable subset of assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// A bundle references a fixed set of assets under a display name.
///
/// Bundles are create-once/read-many: after creation nothing mutates them,
/// and the referenced assets continue to live their own lifecycle.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bundle {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Owning tenant.
    pub org_id: String,

    /// Display name given at creation.
    pub name: String,

    /// Member asset ids, in creation order.
    pub asset_ids: Json<Vec<Uuid>>,

    /// When the bundle was created.
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Public gallery URL for this bundle.
    pub fn url(&self) -> String {
        format!("/gallery/{}", self.id)
    }
}
