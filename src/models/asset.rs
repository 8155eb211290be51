//! Represents a managed photo asset and its record-level metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Origin classification of an asset.
///
/// `EventTemp` assets carry an expiry and may later be converted to `Cloud`;
/// the conversion is one-directional and clears the expiry.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SourceClass {
    /// Permanent cloud storage; never expires.
    Cloud,
    /// Mirrored from a local sync agent.
    LocalSync,
    /// Temporary event upload with an expiry window.
    EventTemp,
}

/// Structured status flags stored in the record's JSON `status` column.
///
/// While `trashed` is set, `original_path` holds the pre-trash location and
/// is the path a restore returns the object to. While the asset is active,
/// `original_path` is absent and ignored.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StatusMetadata {
    /// Whether the asset currently sits in the trash area.
    #[serde(default)]
    pub trashed: bool,

    /// When the asset was moved to trash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<DateTime<Utc>>,

    /// Pre-trash physical path; present only while trashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,

    /// When the asset was last restored from trash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

/// A single managed photo asset: one metadata record, one original object.
///
/// `full_path` is authoritative — it always names where the bytes currently
/// live, and every operation that moves or copies the object updates it in
/// the same logical step. Derived renditions are addressed by convention
/// from the original path and are never recorded here.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct PhotoAsset {
    /// Internal UUID for DB indexing; immutable.
    pub id: Uuid,

    /// Tenant scope; namespaces both queries and storage paths.
    pub org_id: String,

    /// Current object location in storage.
    pub full_path: String,

    /// Origin classification (`cloud`, `local_sync`, `event_temp`).
    pub source_class: SourceClass,

    /// Trash/restore status flags.
    pub status: Json<StatusMetadata>,

    /// Size of the original object in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the original bytes, computed at ingest.
    pub etag: Option<String>,

    /// Content type (MIME type) captured at ingest.
    pub content_type: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// Expiry for `event_temp` assets; null for permanent classes.
    pub expires_at: Option<DateTime<Utc>>,
}

impl PhotoAsset {
    /// Final path segment of the current object location.
    pub fn file_name(&self) -> &str {
        self.full_path
            .split('/')
            .last()
            .unwrap_or(self.full_path.as_str())
    }
}

/// Ephemeral per-request view of an asset used by bulk retrieval.
///
/// Derived from the record at export time and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalDescriptor {
    /// Asset the payload belongs to.
    pub id: Uuid,
    /// Where to fetch the bytes from.
    pub source_path: String,
    /// Filename the delivered payload should carry.
    pub suggested_filename: String,
}

impl RetrievalDescriptor {
    /// Build the export view of an asset from its record.
    pub fn from_asset(asset: &PhotoAsset) -> Self {
        Self {
            id: asset.id,
            source_path: asset.full_path.clone(),
            suggested_filename: asset.file_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset_at(path: &str) -> PhotoAsset {
        PhotoAsset {
            id: Uuid::new_v4(),
            org_id: "acme".into(),
            full_path: path.into(),
            source_class: SourceClass::Cloud,
            status: Json(StatusMetadata::default()),
            size_bytes: 0,
            etag: None,
            content_type: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(asset_at("acme/2025/gala/originals/img.jpg").file_name(), "img.jpg");
        assert_eq!(asset_at("flat.png").file_name(), "flat.png");
    }

    #[test]
    fn descriptor_mirrors_record() {
        let asset = asset_at("acme/2025/gala/originals/img.jpg");
        let desc = RetrievalDescriptor::from_asset(&asset);
        assert_eq!(desc.id, asset.id);
        assert_eq!(desc.source_path, "acme/2025/gala/originals/img.jpg");
        assert_eq!(desc.suggested_filename, "img.jpg");
    }

    #[test]
    fn status_json_defaults_missing_fields() {
        let status: StatusMetadata = serde_json::from_str("{}").unwrap();
        assert!(!status.trashed);
        assert!(status.original_path.is_none());
    }
}
