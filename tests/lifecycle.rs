//! End-to-end lifecycle tests: ingest, trash, restore, permanent delete,
//! event_temp conversion, and variant generation against an in-memory
//! SQLite catalog and object store.

use bytes::Bytes;
use photo_vault::models::asset::{PhotoAsset, SourceClass};
use photo_vault::models::lifecycle::InvalidTransition;
use photo_vault::services::metadata_store::{CatalogError, MetadataStore, NewAsset};
use photo_vault::services::object_store::{MemoryObjectStore, ObjectStore};
use photo_vault::services::trash_service::{TrashError, TrashService};
use photo_vault::services::variant_service::{
    VariantError, VariantRequest, VariantService, derived_path,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::io::Cursor;
use std::sync::Arc;

const ORG: &str = "acme";

async fn test_catalog() -> MetadataStore {
    // One connection so the in-memory database survives across queries.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for stmt in include_str!("../migrations/0001_init.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    MetadataStore::new(Arc::new(pool))
}

async fn ingest(
    catalog: &MetadataStore,
    store: &MemoryObjectStore,
    path: &str,
    class: SourceClass,
    body: &'static [u8],
) -> PhotoAsset {
    let etag = store.upload(path, Bytes::from_static(body)).await.unwrap();
    catalog
        .insert_asset(NewAsset {
            org_id: ORG.to_string(),
            full_path: path.to_string(),
            source_class: class,
            size_bytes: body.len() as i64,
            etag: Some(etag),
            content_type: Some("image/jpeg".to_string()),
            expires_at: match class {
                SourceClass::EventTemp => Some(chrono::Utc::now() + chrono::Duration::days(7)),
                _ => None,
            },
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn soft_delete_then_restore_round_trip() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());
    let trash = TrashService::new(store.clone(), catalog.clone());

    let asset = ingest(
        &catalog,
        &store,
        "acme/2025/gala/originals/img.jpg",
        SourceClass::Cloud,
        b"jpeg-bytes",
    )
    .await;

    let receipt = trash.soft_delete(asset.id, ORG).await.unwrap();
    assert_eq!(receipt.original_path, "acme/2025/gala/originals/img.jpg");
    assert!(receipt.trash_path.starts_with("acme/.trash/"));
    assert!(receipt.trash_path.ends_with("_img.jpg"));

    // Object moved, record follows it.
    assert!(!store.contains("acme/2025/gala/originals/img.jpg"));
    assert!(store.contains(&receipt.trash_path));
    let trashed = catalog.fetch_asset(asset.id).await.unwrap();
    assert_eq!(trashed.full_path, receipt.trash_path);
    assert!(trashed.status.trashed);
    assert!(trashed.status.trashed_at.is_some());
    assert_eq!(
        trashed.status.original_path.as_deref(),
        Some("acme/2025/gala/originals/img.jpg")
    );

    // Trashing twice is refused.
    assert!(matches!(
        trash.soft_delete(asset.id, ORG).await,
        Err(TrashError::State(InvalidTransition { .. }))
    ));

    let receipt = trash.restore(asset.id).await.unwrap();
    assert_eq!(receipt.original_path, "acme/2025/gala/originals/img.jpg");

    assert!(store.contains("acme/2025/gala/originals/img.jpg"));
    assert!(!store.contains(&receipt.trash_path));
    assert_eq!(store.download(&receipt.original_path).await.unwrap(), "jpeg-bytes");
    let restored = catalog.fetch_asset(asset.id).await.unwrap();
    assert_eq!(restored.full_path, "acme/2025/gala/originals/img.jpg");
    assert!(!restored.status.trashed);
    assert!(restored.status.original_path.is_none());
    assert!(restored.status.restored_at.is_some());
}

#[tokio::test]
async fn restore_normalizes_source_class_to_cloud() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());
    let trash = TrashService::new(store.clone(), catalog.clone());

    let asset = ingest(
        &catalog,
        &store,
        "acme/sync/originals/local.jpg",
        SourceClass::LocalSync,
        b"local",
    )
    .await;

    trash.soft_delete(asset.id, ORG).await.unwrap();
    trash.restore(asset.id).await.unwrap();

    let restored = catalog.fetch_asset(asset.id).await.unwrap();
    assert_eq!(restored.source_class, SourceClass::Cloud);
}

#[tokio::test]
async fn permanent_delete_refuses_active_asset() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());
    let trash = TrashService::new(store.clone(), catalog.clone());

    let asset = ingest(&catalog, &store, "acme/a.jpg", SourceClass::Cloud, b"aa").await;

    assert!(matches!(
        trash.permanent_delete(asset.id).await,
        Err(TrashError::State(InvalidTransition { .. }))
    ));

    // Nothing changed.
    assert!(store.contains("acme/a.jpg"));
    assert!(catalog.fetch_asset(asset.id).await.is_ok());
}

#[tokio::test]
async fn permanent_delete_removes_object_and_record() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());
    let trash = TrashService::new(store.clone(), catalog.clone());

    let asset = ingest(&catalog, &store, "acme/a.jpg", SourceClass::Cloud, b"aa").await;
    trash.soft_delete(asset.id, ORG).await.unwrap();

    trash.permanent_delete(asset.id).await.unwrap();

    assert!(store.is_empty());
    assert!(matches!(
        catalog.fetch_asset(asset.id).await,
        Err(CatalogError::AssetNotFound(_))
    ));
}

#[tokio::test]
async fn trash_listing_counts_down_retention() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());
    let trash = TrashService::new(store.clone(), catalog.clone());

    let first = ingest(&catalog, &store, "acme/a.jpg", SourceClass::Cloud, b"aa").await;
    let second = ingest(&catalog, &store, "acme/b.jpg", SourceClass::Cloud, b"bb").await;
    let active = ingest(&catalog, &store, "acme/c.jpg", SourceClass::Cloud, b"cc").await;

    trash.soft_delete(first.id, ORG).await.unwrap();
    // Make the second trash entry strictly newer.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    trash.soft_delete(second.id, ORG).await.unwrap();

    let entries = trash.list_trash(ORG).await.unwrap();
    assert_eq!(entries.len(), 2);
    // Newest trash entry first, just-trashed assets have the full window.
    assert_eq!(entries[0].asset.id, second.id);
    assert_eq!(entries[1].asset.id, first.id);
    assert!(entries.iter().all(|e| e.days_remaining == 30));
    assert!(entries.iter().all(|e| e.asset.id != active.id));

    let active_list = catalog.list_assets(ORG, 100).await.unwrap();
    assert_eq!(active_list.len(), 1);
    assert_eq!(active_list[0].id, active.id);
}

#[tokio::test]
async fn convert_all_event_temp_assets() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());

    let temp_a = ingest(&catalog, &store, "acme/ev/a.jpg", SourceClass::EventTemp, b"a").await;
    let temp_b = ingest(&catalog, &store, "acme/ev/b.jpg", SourceClass::EventTemp, b"b").await;
    let cloud = ingest(&catalog, &store, "acme/c.jpg", SourceClass::Cloud, b"c").await;

    assert_eq!(catalog.count_event_temp(ORG).await.unwrap(), 2);
    let converted = catalog.convert_event_temp(ORG, None).await.unwrap();
    assert_eq!(converted, 2);

    for id in [temp_a.id, temp_b.id] {
        let asset = catalog.fetch_asset(id).await.unwrap();
        assert_eq!(asset.source_class, SourceClass::Cloud);
        assert!(asset.expires_at.is_none());
    }
    assert_eq!(
        catalog.fetch_asset(cloud.id).await.unwrap().source_class,
        SourceClass::Cloud
    );
    assert_eq!(catalog.count_event_temp(ORG).await.unwrap(), 0);

    // One audit entry for the whole conversion.
    assert_eq!(
        catalog.count_usage(ORG, "convert_to_permanent").await.unwrap(),
        1
    );

    // Re-running converts nothing but still logs.
    assert_eq!(catalog.convert_event_temp(ORG, None).await.unwrap(), 0);
}

#[tokio::test]
async fn convert_selected_event_temp_assets() {
    let catalog = test_catalog().await;
    let store = Arc::new(MemoryObjectStore::new());

    let keep = ingest(&catalog, &store, "acme/ev/a.jpg", SourceClass::EventTemp, b"a").await;
    let convert = ingest(&catalog, &store, "acme/ev/b.jpg", SourceClass::EventTemp, b"b").await;

    let converted = catalog
        .convert_event_temp(ORG, Some(&[convert.id]))
        .await
        .unwrap();
    assert_eq!(converted, 1);

    assert_eq!(
        catalog.fetch_asset(convert.id).await.unwrap().source_class,
        SourceClass::Cloud
    );
    assert_eq!(
        catalog.fetch_asset(keep.id).await.unwrap().source_class,
        SourceClass::EventTemp
    );
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

#[tokio::test]
async fn variants_never_upscale_small_originals() {
    let store = Arc::new(MemoryObjectStore::new());
    let variants = VariantService::new(store.clone());

    let png = png_bytes(100, 80);
    store
        .upload("acme/gala/originals/small.png", Bytes::from(png))
        .await
        .unwrap();

    let set = variants
        .generate(VariantRequest {
            path: "acme/gala/originals/small.png".to_string(),
            generate_full: true,
            generate_thumbs: true,
        })
        .await
        .unwrap();

    let full_path = derived_path("acme/gala/originals/small.png", "full");
    let thumb_path = derived_path("acme/gala/originals/small.png", "thumbs");
    assert_eq!(set.full_path.as_deref(), Some(full_path.as_str()));
    assert_eq!(set.thumb_path.as_deref(), Some(thumb_path.as_str()));
    assert_eq!(full_path, "acme/gala/optimized/full/small.jpg");

    // The full rendition keeps the original dimensions.
    let full = image::load_from_memory(&store.download(&full_path).await.unwrap()).unwrap();
    assert_eq!((full.width(), full.height()), (100, 80));

    // Thumbnails are always exact squares, even from small originals.
    let thumb = image::load_from_memory(&store.download(&thumb_path).await.unwrap()).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (400, 400));
}

#[tokio::test]
async fn variants_bound_large_originals() {
    let store = Arc::new(MemoryObjectStore::new());
    let variants = VariantService::new(store.clone());

    store
        .upload(
            "acme/gala/originals/wide.png",
            Bytes::from(png_bytes(4000, 1000)),
        )
        .await
        .unwrap();

    let set = variants
        .generate(VariantRequest {
            path: "acme/gala/originals/wide.png".to_string(),
            generate_full: true,
            generate_thumbs: false,
        })
        .await
        .unwrap();

    assert!(set.thumb_path.is_none());
    let full_path = set.full_path.unwrap();
    let full = image::load_from_memory(&store.download(&full_path).await.unwrap()).unwrap();
    assert_eq!((full.width(), full.height()), (2000, 500));
}

#[tokio::test]
async fn variants_require_the_source_object() {
    let store = Arc::new(MemoryObjectStore::new());
    let variants = VariantService::new(store.clone());

    let err = variants
        .generate(VariantRequest {
            path: "acme/missing.jpg".to_string(),
            generate_full: true,
            generate_thumbs: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VariantError::SourceMissing(_)));
}
