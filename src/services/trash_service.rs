//! src/services/trash_service.rs
//!
//! TrashService — orchestrates the storage and record changes behind
//! soft-delete, restore, and permanent delete. The copy/remove/update
//! sequence is deliberately not a transaction: the first storage mutation
//! of each operation is fatal on failure, cleanup of the now-redundant
//! copy is best-effort, and the metadata record is the authoritative state
//! that must end up correct.

use crate::models::asset::{PhotoAsset, SourceClass, StatusMetadata};
use crate::models::lifecycle::{AssetState, InvalidTransition, Transition};
use crate::services::metadata_store::{CatalogError, MetadataStore};
use crate::services::object_store::{ObjectStore, ObjectStoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Days a trashed asset is kept before it is eligible for permanent
/// deletion. Display-only: nothing sweeps expired trash automatically.
pub const RETENTION_DAYS: i64 = 30;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum TrashError {
    #[error("asset `{0}` has no recorded pre-trash path")]
    MissingOriginalPath(Uuid),
    #[error("copying object to {to} failed: {source}")]
    CopyFailed {
        to: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error(transparent)]
    State(#[from] InvalidTransition),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type TrashResult<T> = Result<T, TrashError>;

/// Paths involved in a trash or restore operation.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TrashReceipt {
    pub trash_path: String,
    pub original_path: String,
}

/// A trashed asset together with its remaining retention window.
#[derive(Clone, Debug, Serialize)]
pub struct TrashEntry {
    #[serde(flatten)]
    pub asset: PhotoAsset,
    pub days_remaining: i64,
}

#[derive(Clone)]
pub struct TrashService {
    store: Arc<dyn ObjectStore>,
    catalog: MetadataStore,
}

impl TrashService {
    pub fn new(store: Arc<dyn ObjectStore>, catalog: MetadataStore) -> Self {
        Self { store, catalog }
    }

    /// Move an asset to the org's trash area.
    ///
    /// Copy first, then remove the original, then update the record. The
    /// copy is fatal on failure (nothing has changed yet); removing the
    /// original is best-effort — once the trash copy exists a dangling
    /// original is an acceptable leak.
    pub async fn soft_delete(&self, asset_id: Uuid, org_slug: &str) -> TrashResult<TrashReceipt> {
        let asset = self.catalog.fetch_asset(asset_id).await?;
        AssetState::of(&asset).apply(Transition::SoftDelete)?;

        let now = Utc::now();
        let original_path = asset.full_path.clone();
        let trash_path = format!(
            "{}/.trash/{}_{}",
            org_slug,
            now.timestamp_millis(),
            asset.file_name()
        );

        self.store
            .copy(&original_path, &trash_path)
            .await
            .map_err(|source| TrashError::CopyFailed {
                to: trash_path.clone(),
                source,
            })?;

        if let Err(err) = self.store.remove(&original_path).await {
            warn!(
                "failed to remove original {} after trash copy: {}",
                original_path, err
            );
        }

        let status = StatusMetadata {
            trashed: true,
            trashed_at: Some(now),
            original_path: Some(original_path.clone()),
            restored_at: None,
        };
        self.catalog
            .update_asset_location(asset_id, &trash_path, &status, None)
            .await?;

        info!("asset {} moved to trash at {}", asset_id, trash_path);
        Ok(TrashReceipt {
            trash_path,
            original_path,
        })
    }

    /// Restore a trashed asset to its pre-trash path.
    ///
    /// The source class always normalizes to `cloud`, whatever it was
    /// before trashing.
    pub async fn restore(&self, asset_id: Uuid) -> TrashResult<TrashReceipt> {
        let asset = self.catalog.fetch_asset(asset_id).await?;
        AssetState::of(&asset).apply(Transition::Restore)?;

        let original_path = asset
            .status
            .original_path
            .clone()
            .ok_or(TrashError::MissingOriginalPath(asset_id))?;
        let trash_path = asset.full_path.clone();

        self.store
            .copy(&trash_path, &original_path)
            .await
            .map_err(|source| TrashError::CopyFailed {
                to: original_path.clone(),
                source,
            })?;

        if let Err(err) = self.store.remove(&trash_path).await {
            warn!(
                "failed to remove trash copy {} after restore: {}",
                trash_path, err
            );
        }

        let status = StatusMetadata {
            trashed: false,
            trashed_at: None,
            original_path: None,
            restored_at: Some(Utc::now()),
        };
        self.catalog
            .update_asset_location(asset_id, &original_path, &status, Some(SourceClass::Cloud))
            .await?;

        info!("asset {} restored to {}", asset_id, original_path);
        Ok(TrashReceipt {
            trash_path,
            original_path,
        })
    }

    /// Permanently delete a trashed asset.
    ///
    /// Refused for assets that are not in the trash. Removing the object is
    /// best-effort (an orphaned blob is tolerable); deleting the record is
    /// fatal on failure, since an orphaned record pointing at nothing is not.
    pub async fn permanent_delete(&self, asset_id: Uuid) -> TrashResult<()> {
        let asset = self.catalog.fetch_asset(asset_id).await?;
        AssetState::of(&asset).apply(Transition::PermanentDelete)?;

        if let Err(err) = self.store.remove(&asset.full_path).await {
            warn!(
                "failed to remove object {} during permanent delete: {}",
                asset.full_path, err
            );
        }

        self.catalog.delete_asset(asset_id).await?;
        info!("asset {} permanently deleted", asset_id);
        Ok(())
    }

    /// Trashed assets for an org, newest first, with retention countdowns.
    pub async fn list_trash(&self, org_id: &str) -> TrashResult<Vec<TrashEntry>> {
        let now = Utc::now();
        let entries = self
            .catalog
            .list_trashed(org_id)
            .await?
            .into_iter()
            .map(|asset| {
                let trashed_at = asset.status.trashed_at.unwrap_or(asset.created_at);
                TrashEntry {
                    days_remaining: days_remaining(trashed_at, now),
                    asset,
                }
            })
            .collect();
        Ok(entries)
    }
}

/// Days left in the retention window, rounded up and floored at zero.
pub fn days_remaining(trashed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let expires = trashed_at + chrono::Duration::days(RETENTION_DAYS);
    let left_ms = (expires - now).num_milliseconds();
    if left_ms <= 0 {
        0
    } else {
        (left_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_window_at_trash_time() {
        let now = Utc::now();
        assert_eq!(days_remaining(now, now), 30);
    }

    #[test]
    fn expired_window_floors_at_zero() {
        let now = Utc::now();
        assert_eq!(days_remaining(now - chrono::Duration::days(31), now), 0);
        assert_eq!(days_remaining(now - chrono::Duration::days(400), now), 0);
    }

    #[test]
    fn partial_days_round_up() {
        let now = Utc::now();
        let trashed = now - chrono::Duration::days(29) - chrono::Duration::hours(12);
        assert_eq!(days_remaining(trashed, now), 1);
        let trashed = now - chrono::Duration::hours(1);
        assert_eq!(days_remaining(trashed, now), 30);
    }

    #[test]
    fn boundary_day_is_zero() {
        let now = Utc::now();
        assert_eq!(days_remaining(now - chrono::Duration::days(30), now), 0);
    }
}
