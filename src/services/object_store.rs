//! src/services/object_store.rs
//!
//! ObjectStore — the seam between the lifecycle engine and physical byte
//! storage. The trait mirrors the primitives the rest of the service needs
//! (download, upload, copy, remove, list, signed read URLs); `DiskObjectStore`
//! is the durable local backend, `MemoryObjectStore` backs tests.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

const MAX_PATH_LEN: usize = 1024;

/// Path-addressed binary storage.
///
/// Paths are logical, org-scoped, `/`-separated keys like
/// `acme/2025/gala/originals/img.jpg`. Uploads overwrite, so every caller
/// may safely re-run its own writes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full object at `path`.
    async fn download(&self, path: &str) -> ObjectStoreResult<Bytes>;

    /// Write (or overwrite) the object at `path`. Returns the MD5 etag of
    /// the stored bytes.
    async fn upload(&self, path: &str, bytes: Bytes) -> ObjectStoreResult<String>;

    /// Copy the object at `from` to `to`, overwriting any existing object.
    async fn copy(&self, from: &str, to: &str) -> ObjectStoreResult<()>;

    /// Remove the object at `path`.
    async fn remove(&self, path: &str) -> ObjectStoreResult<()>;

    /// List all object paths beneath `prefix`, lexicographically ordered.
    async fn list(&self, prefix: &str) -> ObjectStoreResult<Vec<String>>;

    /// Issue a temporary signed read URL for `path`.
    fn signed_read_url(&self, path: &str, ttl: Duration) -> String;
}

/// Issues and checks expiring read-URL signatures.
///
/// The signature is the URL-safe base64 (no padding) of
/// `md5("{secret}:{path}:{expires}")`. Verification also enforces the
/// expiry against the current clock.
#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Signature for `path` valid until the `expires` unix timestamp.
    pub fn signature(&self, path: &str, expires: i64) -> String {
        let digest = md5::compute(format!("{}:{}:{}", self.secret, path, expires));
        URL_SAFE_NO_PAD.encode(digest.0)
    }

    /// Build a relative signed URL served by the object read endpoint.
    pub fn signed_url(&self, path: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        format!(
            "/objects/{}?expires={}&sig={}",
            path,
            expires,
            self.signature(path, expires)
        )
    }

    /// Check an incoming `expires`/`sig` pair against `path`.
    pub fn verify(&self, path: &str, expires: i64, sig: &str) -> bool {
        if expires < Utc::now().timestamp() {
            return false;
        }
        self.signature(path, expires) == sig
    }
}

/// Local-disk object store.
///
/// Objects live at `base_path/{logical path}`. Uploads are durable: bytes
/// are written to a temp file, fsynced, and atomically renamed into place.
/// Removal prunes directories that become empty so trash churn does not
/// leave an ever-growing skeleton behind.
#[derive(Clone)]
pub struct DiskObjectStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            base_path: base_path.into(),
            signer,
        }
    }

    /// Basic path validation to avoid trivial traversal vectors.
    ///
    /// Rejects empty or oversized paths, absolute paths, `..`, and control
    /// bytes. Logical paths here are always org-scoped relative keys.
    fn ensure_path_safe(path: &str) -> ObjectStoreResult<()> {
        if path.is_empty() || path.len() > MAX_PATH_LEN {
            return Err(ObjectStoreError::InvalidPath);
        }
        if path.starts_with('/') || path.contains("..") {
            return Err(ObjectStoreError::InvalidPath);
        }
        if path
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ObjectStoreError::InvalidPath);
        }
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.base_path.clone();
        for segment in path.split('/') {
            full.push(segment);
        }
        full
    }

    /// Remove empty directories from `start` up to (but not including) the
    /// store root. Stops at the first non-empty or missing directory.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn download(&self, path: &str) -> ObjectStoreResult<Bytes> {
        Self::ensure_path_safe(path)?;
        let file_path = self.resolve(path);
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    async fn upload(&self, path: &str, bytes: Bytes) -> ObjectStoreResult<String> {
        Self::ensure_path_safe(path)?;
        let file_path = self.resolve(path);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or(ObjectStoreError::InvalidPath)?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }

        debug!("stored {} ({} bytes)", path, bytes.len());
        Ok(format!("{:x}", md5::compute(&bytes)))
    }

    async fn copy(&self, from: &str, to: &str) -> ObjectStoreResult<()> {
        let bytes = self.download(from).await?;
        self.upload(to, bytes).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> ObjectStoreResult<()> {
        Self::ensure_path_safe(path)?;
        let file_path = self.resolve(path);
        match fs::remove_file(&file_path).await {
            Ok(_) => {
                if let Some(parent) = file_path.parent() {
                    self.prune_empty_dirs(parent).await;
                }
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(err) => Err(ObjectStoreError::Io(err)),
        }
    }

    async fn list(&self, prefix: &str) -> ObjectStoreResult<Vec<String>> {
        if !prefix.is_empty() {
            Self::ensure_path_safe(prefix)?;
        }
        let mut paths = Vec::new();
        let mut pending = vec![self.base_path.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(ObjectStoreError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                let logical = entry_path
                    .strip_prefix(&self.base_path)
                    .map_err(|_| ObjectStoreError::InvalidPath)?
                    .to_string_lossy()
                    .replace('\\', "/");
                if logical.starts_with(prefix) {
                    paths.push(logical);
                }
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn signed_read_url(&self, path: &str, ttl: Duration) -> String {
        self.signer.signed_url(path, ttl)
    }
}

/// In-memory object store used by tests.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            signer: UrlSigner::new("memory"),
        }
    }

    /// Whether an object currently exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(path))
            .unwrap_or(false)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, path: &str) -> ObjectStoreResult<Bytes> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| ObjectStoreError::Io(io::Error::other("store lock poisoned")))?;
        objects
            .get(path)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(path.to_string()))
    }

    async fn upload(&self, path: &str, bytes: Bytes) -> ObjectStoreResult<String> {
        let etag = format!("{:x}", md5::compute(&bytes));
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| ObjectStoreError::Io(io::Error::other("store lock poisoned")))?;
        objects.insert(path.to_string(), bytes);
        Ok(etag)
    }

    async fn copy(&self, from: &str, to: &str) -> ObjectStoreResult<()> {
        let bytes = self.download(from).await?;
        self.upload(to, bytes).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> ObjectStoreResult<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| ObjectStoreError::Io(io::Error::other("store lock poisoned")))?;
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> ObjectStoreResult<Vec<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| ObjectStoreError::Io(io::Error::other("store lock poisoned")))?;
        let mut paths: Vec<String> = objects
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn signed_read_url(&self, path: &str, ttl: Duration) -> String {
        self.signer.signed_url(path, ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let signer = UrlSigner::new("s3cr3t");
        let expires = Utc::now().timestamp() + 600;
        let sig = signer.signature("acme/img.jpg", expires);
        assert!(signer.verify("acme/img.jpg", expires, &sig));
    }

    #[test]
    fn tampered_path_fails_verification() {
        let signer = UrlSigner::new("s3cr3t");
        let expires = Utc::now().timestamp() + 600;
        let sig = signer.signature("acme/img.jpg", expires);
        assert!(!signer.verify("acme/other.jpg", expires, &sig));
        assert!(!signer.verify("acme/img.jpg", expires + 1, &sig));
    }

    #[test]
    fn expired_signature_fails_verification() {
        let signer = UrlSigner::new("s3cr3t");
        let expires = Utc::now().timestamp() - 1;
        let sig = signer.signature("acme/img.jpg", expires);
        assert!(!signer.verify("acme/img.jpg", expires, &sig));
    }

    #[test]
    fn signed_url_shape() {
        let signer = UrlSigner::new("s3cr3t");
        let url = signer.signed_url("acme/img.jpg", Duration::from_secs(60));
        assert!(url.starts_with("/objects/acme/img.jpg?expires="));
        assert!(url.contains("&sig="));
    }

    #[test]
    fn rejects_traversal_paths() {
        assert!(DiskObjectStore::ensure_path_safe("../etc/passwd").is_err());
        assert!(DiskObjectStore::ensure_path_safe("/abs/path").is_err());
        assert!(DiskObjectStore::ensure_path_safe("").is_err());
        assert!(DiskObjectStore::ensure_path_safe("acme/2025/originals/img.jpg").is_ok());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store
            .upload("acme/a.jpg", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert_eq!(store.download("acme/a.jpg").await.unwrap(), "abc");

        store.copy("acme/a.jpg", "acme/.trash/1_a.jpg").await.unwrap();
        assert_eq!(
            store.list("acme/").await.unwrap(),
            vec!["acme/.trash/1_a.jpg".to_string(), "acme/a.jpg".to_string()]
        );

        store.remove("acme/a.jpg").await.unwrap();
        assert!(matches!(
            store.download("acme/a.jpg").await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn disk_store_upload_download_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path(), UrlSigner::new("test"));

        let etag = store
            .upload("acme/2025/originals/img.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert_eq!(etag, format!("{:x}", md5::compute(b"jpeg")));
        assert_eq!(
            store.download("acme/2025/originals/img.jpg").await.unwrap(),
            "jpeg"
        );

        store.remove("acme/2025/originals/img.jpg").await.unwrap();
        // empty intermediate directories are pruned back to the root
        assert!(!dir.path().join("acme").exists());
    }

    #[tokio::test]
    async fn disk_store_overwrites_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path(), UrlSigner::new("test"));
        store
            .upload("acme/img.jpg", Bytes::from_static(b"one"))
            .await
            .unwrap();
        store
            .upload("acme/img.jpg", Bytes::from_static(b"two"))
            .await
            .unwrap();
        assert_eq!(store.download("acme/img.jpg").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn disk_store_list_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskObjectStore::new(dir.path(), UrlSigner::new("test"));
        store
            .upload("acme/a.jpg", Bytes::from_static(b"a"))
            .await
            .unwrap();
        store
            .upload("acme/.trash/1_b.jpg", Bytes::from_static(b"b"))
            .await
            .unwrap();
        store
            .upload("other/c.jpg", Bytes::from_static(b"c"))
            .await
            .unwrap();

        assert_eq!(
            store.list("acme/.trash/").await.unwrap(),
            vec!["acme/.trash/1_b.jpg".to_string()]
        );
        assert_eq!(store.list("acme/").await.unwrap().len(), 2);
    }
}
