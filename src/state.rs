//! Shared application state carried by every handler.

use crate::services::metadata_store::MetadataStore;
use crate::services::object_store::{ObjectStore, UrlSigner};
use crate::services::trash_service::TrashService;
use crate::services::variant_service::VariantService;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub catalog: MetadataStore,
    pub objects: Arc<dyn ObjectStore>,
    pub signer: UrlSigner,
    pub variants: VariantService,
    pub trash: TrashService,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, objects: Arc<dyn ObjectStore>, signer: UrlSigner) -> Self {
        let catalog = MetadataStore::new(db);
        Self {
            catalog: catalog.clone(),
            objects: objects.clone(),
            signer,
            variants: VariantService::new(objects.clone()),
            trash: TrashService::new(objects, catalog),
        }
    }
}
