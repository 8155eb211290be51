//! src/services/metadata_store.rs
//!
//! MetadataStore — the asset catalog over SQLite. One row per managed
//! asset plus the adjacent `bundles` and `usage_logs` tables. The record is
//! authoritative for lifecycle decisions: `full_path` always names where the
//! bytes live, and any operation that moves the object updates the path and
//! the status flags in the same statement.

use crate::models::asset::{PhotoAsset, SourceClass, StatusMetadata};
use crate::models::bundle::Bundle;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite, types::Json};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("asset `{0}` not found")]
    AssetNotFound(Uuid),
    #[error("bundle `{0}` not found")]
    BundleNotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Fields required to create an asset record at ingest time.
#[derive(Clone, Debug)]
pub struct NewAsset {
    pub org_id: String,
    pub full_path: String,
    pub source_class: SourceClass,
    pub size_bytes: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

const ASSET_COLUMNS: &str = "id, org_id, full_path, source_class, status, size_bytes, \
     etag, content_type, created_at, expires_at";

#[derive(Clone)]
pub struct MetadataStore {
    db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Cheap connectivity check used by the readiness probe.
    pub async fn ping(&self) -> CatalogResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    /// Insert a freshly ingested asset. The record starts active with an
    /// empty status block.
    pub async fn insert_asset(&self, new: NewAsset) -> CatalogResult<PhotoAsset> {
        let asset = sqlx::query_as::<_, PhotoAsset>(
            "INSERT INTO assets (
                 id, org_id, full_path, source_class, status, size_bytes,
                 etag, content_type, created_at, expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id, org_id, full_path, source_class, status, size_bytes,
                       etag, content_type, created_at, expires_at",
        )
        .bind(Uuid::new_v4())
        .bind(&new.org_id)
        .bind(&new.full_path)
        .bind(new.source_class)
        .bind(Json(StatusMetadata::default()))
        .bind(new.size_bytes)
        .bind(&new.etag)
        .bind(&new.content_type)
        .bind(Utc::now())
        .bind(new.expires_at)
        .fetch_one(&*self.db)
        .await?;
        Ok(asset)
    }

    /// Fetch an asset record by id.
    pub async fn fetch_asset(&self, id: Uuid) -> CatalogResult<PhotoAsset> {
        sqlx::query_as::<_, PhotoAsset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::AssetNotFound(id),
            other => CatalogError::Sqlx(other),
        })
    }

    /// Fetch a set of assets by id, in the order the ids were given.
    /// Unknown ids surface as `AssetNotFound`.
    pub async fn fetch_assets(&self, ids: &[Uuid]) -> CatalogResult<Vec<PhotoAsset>> {
        let mut assets = Vec::with_capacity(ids.len());
        for id in ids {
            assets.push(self.fetch_asset(*id).await?);
        }
        Ok(assets)
    }

    /// Fetch whichever of the given assets still exist, skipping deleted
    /// ids. Bundle reads use this: members may have been permanently
    /// deleted since the bundle was created.
    pub async fn fetch_existing_assets(&self, ids: &[Uuid]) -> CatalogResult<Vec<PhotoAsset>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        builder.push(") ORDER BY created_at DESC");
        let assets = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(assets)
    }

    /// List active (non-trashed) assets for an org, newest first.
    pub async fn list_assets(&self, org_id: &str, limit: i64) -> CatalogResult<Vec<PhotoAsset>> {
        let assets = sqlx::query_as::<_, PhotoAsset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets
             WHERE org_id = ? AND COALESCE(json_extract(status, '$.trashed'), 0) = 0
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(org_id)
        .bind(limit)
        .fetch_all(&*self.db)
        .await?;
        Ok(assets)
    }

    /// List trashed assets for an org, newest trash entry first.
    pub async fn list_trashed(&self, org_id: &str) -> CatalogResult<Vec<PhotoAsset>> {
        let assets = sqlx::query_as::<_, PhotoAsset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets
             WHERE org_id = ? AND json_extract(status, '$.trashed') = 1
             ORDER BY COALESCE(json_extract(status, '$.trashed_at'), created_at) DESC"
        ))
        .bind(org_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(assets)
    }

    /// Move an asset record to a new physical location, updating the path
    /// and the status flags in one statement. When `source_class` is given
    /// (restore normalizes to `cloud`) it is updated in the same step.
    pub async fn update_asset_location(
        &self,
        id: Uuid,
        full_path: &str,
        status: &StatusMetadata,
        source_class: Option<SourceClass>,
    ) -> CatalogResult<()> {
        let result = if let Some(class) = source_class {
            sqlx::query(
                "UPDATE assets SET full_path = ?, status = ?, source_class = ? WHERE id = ?",
            )
            .bind(full_path)
            .bind(Json(status))
            .bind(class)
            .bind(id)
            .execute(&*self.db)
            .await?
        } else {
            sqlx::query("UPDATE assets SET full_path = ?, status = ? WHERE id = ?")
                .bind(full_path)
                .bind(Json(status))
                .bind(id)
                .execute(&*self.db)
                .await?
        };

        if result.rows_affected() == 0 {
            return Err(CatalogError::AssetNotFound(id));
        }
        Ok(())
    }

    /// Convert `event_temp` assets to permanent cloud storage.
    ///
    /// A single filtered UPDATE sets `source_class = cloud` and clears the
    /// expiry; the conversion is one-directional. When `ids` is given only
    /// that subset is touched, otherwise every matching record in the org
    /// converts. One audit entry records the converted count.
    pub async fn convert_event_temp(
        &self,
        org_id: &str,
        ids: Option<&[Uuid]>,
    ) -> CatalogResult<u64> {
        let ids = ids.filter(|ids| !ids.is_empty());

        let mut builder = QueryBuilder::<Sqlite>::new(
            "UPDATE assets SET source_class = 'cloud', expires_at = NULL WHERE org_id = ",
        );
        builder.push_bind(org_id);
        builder.push(" AND source_class = 'event_temp'");
        if let Some(ids) = ids {
            builder.push(" AND id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            builder.push(")");
        }

        let converted = builder.build().execute(&*self.db).await?.rows_affected();

        self.log_usage(
            org_id,
            None,
            "convert_to_permanent",
            serde_json::json!({
                "converted_count": converted,
                "converted_at": Utc::now(),
            }),
        )
        .await?;

        info!("converted {} event_temp asset(s) for org {}", converted, org_id);
        Ok(converted)
    }

    /// Count of `event_temp` assets still awaiting conversion for an org.
    pub async fn count_event_temp(&self, org_id: &str) -> CatalogResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM assets WHERE org_id = ? AND source_class = 'event_temp'",
        )
        .bind(org_id)
        .fetch_one(&*self.db)
        .await?;
        Ok(count)
    }

    /// Delete an asset record outright. Only permanent delete uses this.
    pub async fn delete_asset(&self, id: Uuid) -> CatalogResult<()> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::AssetNotFound(id));
        }
        Ok(())
    }

    /// Append an audit entry to the usage log.
    pub async fn log_usage(
        &self,
        org_id: &str,
        user_id: Option<&str>,
        action: &str,
        metadata: serde_json::Value,
    ) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO usage_logs (id, org_id, user_id, action, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(user_id)
        .bind(action)
        .bind(Json(metadata))
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Number of audit entries recorded for an action within an org.
    pub async fn count_usage(&self, org_id: &str, action: &str) -> CatalogResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM usage_logs WHERE org_id = ? AND action = ?",
        )
        .bind(org_id)
        .bind(action)
        .fetch_one(&*self.db)
        .await?;
        Ok(count)
    }

    /// Create a named, shareable bundle referencing a set of assets.
    /// Bundles are create-once/read-many; there is no mutation path.
    pub async fn create_bundle(
        &self,
        org_id: &str,
        name: &str,
        asset_ids: &[Uuid],
    ) -> CatalogResult<Bundle> {
        let bundle = Bundle {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            name: name.to_string(),
            asset_ids: Json(asset_ids.to_vec()),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO bundles (id, org_id, name, asset_ids, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(bundle.id)
        .bind(&bundle.org_id)
        .bind(&bundle.name)
        .bind(&bundle.asset_ids)
        .bind(bundle.created_at)
        .execute(&*self.db)
        .await?;
        Ok(bundle)
    }

    /// Fetch a bundle by id.
    pub async fn fetch_bundle(&self, id: Uuid) -> CatalogResult<Bundle> {
        sqlx::query_as::<_, Bundle>(
            "SELECT id, org_id, name, asset_ids, created_at FROM bundles WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::BundleNotFound(id),
            other => CatalogError::Sqlx(other),
        })
    }
}
