//! src/services/delivery.rs
//!
//! DeliveryService — turns a set of retrieved payloads into something the
//! user actually receives. A host hand-off provider is probed against the
//! concrete payload set first; when no provider is configured, the probe
//! declines, or the hand-off fails, the payloads are bundled into one
//! gzip-compressed tar archive persisted under a date-stamped name.

use crate::services::retrieval::RetrievedPayload;
use async_trait::async_trait;
use chrono::Utc;
use flate2::{Compression, write::GzEncoder};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("archive assembly failed: {0}")]
    Assembly(#[source] io::Error),
    #[error("could not persist archive: {0}")]
    Persist(#[source] io::Error),
    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// How a hand-off attempt ended. A dismissal by the user is a clean,
/// successful termination, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandoffResult {
    Completed,
    Dismissed,
}

/// Host-platform delivery of a concrete file set.
///
/// `supports` probes the actual payload set, not a generic capability
/// flag; a hand-off error falls through to archive assembly rather than
/// failing the delivery.
#[async_trait]
pub trait HandoffProvider: Send + Sync {
    fn supports(&self, payloads: &[RetrievedPayload]) -> bool;

    async fn hand_off(
        &self,
        payloads: &[RetrievedPayload],
        label: &str,
    ) -> Result<HandoffResult, io::Error>;
}

/// What deliver() produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The host platform took the file set.
    HandedOff,
    /// The user dismissed the hand-off; nothing further to do.
    Dismissed,
    /// Payloads were bundled and saved locally.
    Archived { path: PathBuf, size_bytes: u64 },
}

#[derive(Clone)]
pub struct DeliveryService {
    handoff: Option<Arc<dyn HandoffProvider>>,
    export_dir: PathBuf,
}

impl DeliveryService {
    pub fn new(handoff: Option<Arc<dyn HandoffProvider>>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            handoff,
            export_dir: export_dir.into(),
        }
    }

    /// Deliver a payload set under a selection label.
    pub async fn deliver(
        &self,
        payloads: Vec<RetrievedPayload>,
        label: &str,
    ) -> DeliveryResult<DeliveryOutcome> {
        if let Some(handoff) = &self.handoff {
            if handoff.supports(&payloads) {
                match handoff.hand_off(&payloads, label).await {
                    Ok(HandoffResult::Completed) => {
                        info!("handed {} payload(s) off to the host platform", payloads.len());
                        return Ok(DeliveryOutcome::HandedOff);
                    }
                    Ok(HandoffResult::Dismissed) => {
                        info!("hand-off dismissed by the user");
                        return Ok(DeliveryOutcome::Dismissed);
                    }
                    Err(err) => {
                        warn!("hand-off failed, falling back to archive: {}", err);
                    }
                }
            }
        }
        self.archive(payloads, label).await
    }

    /// Bundle every payload into one `.tar.gz` under the export directory.
    ///
    /// Entry names come straight from the suggested filenames; name
    /// collisions are not de-duplicated. Failure leaves no partial output
    /// behind.
    async fn archive(
        &self,
        payloads: Vec<RetrievedPayload>,
        label: &str,
    ) -> DeliveryResult<DeliveryOutcome> {
        let count = payloads.len();
        let data = tokio::task::spawn_blocking(move || build_archive(&payloads))
            .await?
            .map_err(DeliveryError::Assembly)?;
        let size_bytes = data.len() as u64;

        let archive_name = format!("{}-{}.tar.gz", slug(label), Utc::now().format("%Y%m%d"));
        let final_path = self.export_dir.join(&archive_name);
        let tmp_path = self.export_dir.join(format!(".tmp-{}", Uuid::new_v4()));

        fs::create_dir_all(&self.export_dir)
            .await
            .map_err(DeliveryError::Persist)?;
        if let Err(err) = fs::write(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DeliveryError::Persist(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(DeliveryError::Persist(err));
        }

        info!(
            "archived {} payload(s) into {} ({} bytes)",
            count,
            final_path.display(),
            size_bytes
        );
        Ok(DeliveryOutcome::Archived {
            path: final_path,
            size_bytes,
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
}

/// Assemble a gzip-compressed tar with one entry per payload.
fn build_archive(payloads: &[RetrievedPayload]) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mtime = Utc::now().timestamp().max(0) as u64;

    for payload in payloads {
        let mut header = tar::Header::new_gnu();
        header.set_size(payload.bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        builder.append_data(&mut header, payload.filename(), payload.bytes.as_ref())?;
    }

    builder.into_inner()?.finish()
}

/// Filesystem-safe slug of a selection label.
fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_dash = true;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "export".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::asset::RetrievalDescriptor;
    use bytes::Bytes;
    use flate2::read::GzDecoder;

    fn payload(name: &str, body: &'static [u8]) -> RetrievedPayload {
        RetrievedPayload {
            descriptor: RetrievalDescriptor {
                id: Uuid::new_v4(),
                source_path: format!("acme/originals/{name}"),
                suggested_filename: name.to_string(),
            },
            bytes: Bytes::from_static(body),
        }
    }

    #[test]
    fn slug_normalizes_labels() {
        assert_eq!(slug("Summer Gala 2025"), "summer-gala-2025");
        assert_eq!(slug("  --weird__label!!  "), "weird-label");
        assert_eq!(slug("???"), "export");
    }

    #[test]
    fn archive_keeps_entry_names_and_contents() {
        let payloads = vec![payload("a.jpg", b"aaa"), payload("b.jpg", b"bbbb")];
        let data = build_archive(&payloads).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(&data[..]));
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut body).unwrap();
            seen.push((name, body.len()));
        }
        assert_eq!(
            seen,
            vec![("a.jpg".to_string(), 3), ("b.jpg".to_string(), 4)]
        );
    }

    #[test]
    fn archive_does_not_deduplicate_colliding_names() {
        let payloads = vec![payload("dup.jpg", b"one"), payload("dup.jpg", b"two")];
        let data = build_archive(&payloads).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(&data[..]));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["dup.jpg", "dup.jpg"]);
    }
}
