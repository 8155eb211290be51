//! src/services/retrieval.rs
//!
//! RetrievalCoordinator — concurrent, retrying fetches for a selected set
//! of assets. Every descriptor runs as its own task (unbounded by default,
//! optionally capped by a semaphore), each with a fixed-delay retry loop
//! that observes a shared cancellation token at the top of every attempt
//! and across the retry sleep. Results are collected by input index, so
//! the output order always matches the input order regardless of which
//! task finishes first.

use crate::models::asset::RetrievalDescriptor;
use crate::services::object_store::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval cancelled")]
    Cancelled,
    #[error("fetching `{path}` gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        path: String,
        attempts: u32,
        #[source]
        source: ObjectStoreError,
    },
    #[error("retrieval task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Narrow fetch seam the coordinator retrieves payloads through.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Bytes, ObjectStoreError>;
}

/// `PayloadSource` over an object store's download primitive.
pub struct StoreSource(Arc<dyn ObjectStore>);

impl StoreSource {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self(store)
    }
}

#[async_trait]
impl PayloadSource for StoreSource {
    async fn fetch(&self, path: &str) -> Result<Bytes, ObjectStoreError> {
        self.0.download(path).await
    }
}

/// Retry and fan-out knobs.
///
/// Defaults reproduce the observed behavior: three attempts, a fixed
/// 500ms inter-attempt delay, and unlimited fan-out. `max_concurrent`
/// bounds the fan-out with a semaphore when set.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub max_concurrent: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(500),
            max_concurrent: None,
        }
    }
}

/// One fetched payload, still carrying the descriptor it came from.
#[derive(Clone, Debug)]
pub struct RetrievedPayload {
    pub descriptor: RetrievalDescriptor,
    pub bytes: Bytes,
}

impl RetrievedPayload {
    pub fn filename(&self) -> &str {
        &self.descriptor.suggested_filename
    }
}

/// Monotonically increasing completed-count the caller may poll while a
/// retrieval is in flight. Counts tasks as they finish, whether they
/// succeeded or exhausted their retries, so the count always reaches
/// `total` once every task has settled.
pub struct ProgressCounter {
    total: usize,
    completed: AtomicUsize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    fn mark_one(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct RetrievalCoordinator {
    source: Arc<dyn PayloadSource>,
    config: RetrievalConfig,
}

impl RetrievalCoordinator {
    pub fn new(source: Arc<dyn PayloadSource>, config: RetrievalConfig) -> Self {
        Self { source, config }
    }

    /// Fetch every descriptor's payload, preserving input order.
    ///
    /// Waits for all tasks. Any observed cancellation yields `Cancelled`;
    /// otherwise the first (in input order) descriptor that exhausts its
    /// retries fails the whole call.
    pub async fn retrieve(
        &self,
        descriptors: Vec<RetrievalDescriptor>,
        cancel: CancellationToken,
        progress: Arc<ProgressCounter>,
    ) -> RetrievalResult<Vec<RetrievedPayload>> {
        // Single descriptor: fetch directly, no fan-out machinery.
        if descriptors.len() == 1 {
            let mut descriptors = descriptors;
            let descriptor = descriptors.remove(0);
            let result =
                fetch_with_retry(self.source.as_ref(), &descriptor, &self.config, &cancel).await;
            progress.mark_one();
            return Ok(vec![RetrievedPayload {
                descriptor,
                bytes: result?,
            }]);
        }

        let semaphore = self
            .config
            .max_concurrent
            .map(|permits| Arc::new(Semaphore::new(permits)));

        let mut handles = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.iter().cloned().enumerate() {
            let source = self.source.clone();
            let config = self.config.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match &semaphore {
                    Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
                    None => None,
                };
                let result = fetch_with_retry(source.as_ref(), &descriptor, &config, &cancel).await;
                progress.mark_one();
                (index, descriptor, result)
            }));
        }

        let mut slots: Vec<Option<RetrievedPayload>> = Vec::new();
        slots.resize_with(handles.len(), || None);
        let mut cancelled = false;
        let mut first_failure: Option<RetrievalError> = None;

        // Handles are awaited in spawn order, so the first failure seen is
        // the first in input order.
        for handle in handles {
            let (index, descriptor, result) = handle.await?;
            match result {
                Ok(bytes) => slots[index] = Some(RetrievedPayload { descriptor, bytes }),
                Err(RetrievalError::Cancelled) => cancelled = true,
                Err(err) => {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        if cancelled || cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        if let Some(err) = first_failure {
            return Err(err);
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Per-item retry loop.
///
/// Cancellation is checked at the top of each attempt and raced against the
/// retry sleep; an in-flight fetch is not aborted, but its result is
/// discarded once cancellation is observed.
async fn fetch_with_retry(
    source: &dyn PayloadSource,
    descriptor: &RetrievalDescriptor,
    config: &RetrievalConfig,
    cancel: &CancellationToken,
) -> RetrievalResult<Bytes> {
    let attempts = config.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        match source.fetch(&descriptor.source_path).await {
            Ok(bytes) => {
                if cancel.is_cancelled() {
                    return Err(RetrievalError::Cancelled);
                }
                debug!(
                    "fetched {} ({} bytes) on attempt {}",
                    descriptor.source_path,
                    bytes.len(),
                    attempt
                );
                return Ok(bytes);
            }
            Err(source_err) => {
                if attempt >= attempts {
                    return Err(RetrievalError::RetryExhausted {
                        path: descriptor.source_path.clone(),
                        attempts: attempt,
                        source: source_err,
                    });
                }
                warn!(
                    "fetch of {} failed on attempt {}/{}: {}, retrying",
                    descriptor.source_path, attempt, attempts, source_err
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }
}
