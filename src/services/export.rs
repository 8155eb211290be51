//! src/services/export.rs
//!
//! ExportService — the end-to-end bulk export flow: resolve the selected
//! asset ids through the catalog, fetch every payload, then hand the set to
//! the delivery layer. A cancelled retrieval returns before any delivery is
//! attempted.

use crate::models::asset::RetrievalDescriptor;
use crate::services::delivery::{DeliveryError, DeliveryOutcome, DeliveryService};
use crate::services::metadata_store::{CatalogError, MetadataStore};
use crate::services::retrieval::{ProgressCounter, RetrievalCoordinator, RetrievalError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// What an export produced.
#[derive(Debug)]
pub struct ExportReport {
    pub outcome: DeliveryOutcome,
    pub count: usize,
}

pub struct ExportService {
    catalog: MetadataStore,
    retrieval: RetrievalCoordinator,
    delivery: DeliveryService,
}

impl ExportService {
    pub fn new(
        catalog: MetadataStore,
        retrieval: RetrievalCoordinator,
        delivery: DeliveryService,
    ) -> Self {
        Self {
            catalog,
            retrieval,
            delivery,
        }
    }

    /// Export the selected assets under `label`.
    ///
    /// Unknown ids fail the export up front; nothing is skipped silently.
    /// `progress` should be sized to `asset_ids.len()` and may be polled
    /// while the export runs.
    pub async fn export(
        &self,
        asset_ids: &[Uuid],
        label: &str,
        cancel: CancellationToken,
        progress: Arc<ProgressCounter>,
    ) -> ExportResult<ExportReport> {
        let descriptors: Vec<RetrievalDescriptor> = self
            .catalog
            .fetch_assets(asset_ids)
            .await?
            .iter()
            .map(RetrievalDescriptor::from_asset)
            .collect();
        let count = descriptors.len();

        let payloads = self.retrieval.retrieve(descriptors, cancel, progress).await?;
        let outcome = self.delivery.deliver(payloads, label).await?;

        info!("export `{}` delivered {} asset(s)", label, count);
        Ok(ExportReport { outcome, count })
    }
}
