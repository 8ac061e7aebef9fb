//! Filesystem-backed object store.
//!
//! Objects live at `{root}/{bucket}/{key}`. Locators point at the HTTP
//! server, which serves the bucket directory when this backend is active.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{generate_object_key, ObjectInfo, ObjectStore, StorageError};

pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
    base_url: String,
}

impl LocalObjectStore {
    /// Create the store, making sure the bucket directory exists.
    ///
    /// `base_url` is the externally reachable origin, e.g. `http://localhost:8000`.
    pub async fn open(
        root: impl Into<PathBuf>,
        bucket: &str,
        base_url: &str,
    ) -> Result<Self, StorageError> {
        let store = Self {
            root: root.into(),
            bucket: bucket.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        };
        let dir = store.bucket_dir();
        if !dir.exists() {
            tokio::fs::create_dir_all(&dir).await?;
            info!("Created bucket directory: {}", dir.display());
        }
        Ok(store)
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(StorageError::InvalidLocator {
                locator: key.to_string(),
                bucket: self.bucket.clone(),
            });
        }
        Ok(self.bucket_dir().join(key))
    }

    fn path_for_locator(&self, locator: &str) -> Result<(String, PathBuf), StorageError> {
        let key = self.key_from_locator(locator)?.to_string();
        let path = self.object_path(&key)?;
        Ok((key, path))
    }
}

fn content_etag(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn guess_content_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn locator_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, key)
    }

    async fn put(
        &self,
        content: &[u8],
        extension: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = generate_object_key(extension);
        let path = self.object_path(&key)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;
        debug!(
            "Stored {} bytes ({}) at {}",
            content.len(),
            content_type,
            path.display()
        );
        info!("Successfully uploaded file: {}", key);
        Ok(self.locator_for(&key))
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        let (key, path) = self.path_for_locator(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key)),
            Err(e) => Err(StorageError::Download(e.to_string())),
        }
    }

    async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        let (key, path) = self.path_for_locator(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Successfully deleted file: {}", key);
                Ok(true)
            }
            Err(e) => {
                warn!("Error deleting file {}: {}", key, e);
                Ok(false)
            }
        }
    }

    async fn stat(&self, locator: &str) -> Result<Option<ObjectInfo>, StorageError> {
        let (key, path) = self.path_for_locator(locator)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content = tokio::fs::read(&path).await?;

        Ok(Some(ObjectInfo {
            object_name: key,
            size: metadata.len(),
            content_type: guess_content_type(&path),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            etag: Some(content_etag(&content)),
        }))
    }
}
