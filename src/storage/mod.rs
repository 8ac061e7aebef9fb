//! Object storage for uploaded protocol files.
//!
//! Objects are stored under a freshly generated `{uuid}.{ext}` key and
//! addressed by a locator of the form `{scheme}://{endpoint}/{bucket}/{key}`.
//! Reads and deletes recover the key by splitting the locator on `/{bucket}/`.

mod local;
mod s3;

pub use local::LocalObjectStore;
pub use s3::{S3Config, S3ObjectStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by object store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to upload file: {0}")]
    Upload(String),
    #[error("Failed to download file: {0}")]
    Download(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("locator '{locator}' does not reference bucket '{bucket}'")]
    InvalidLocator { locator: String, bucket: String },
    #[error("object store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object store error: {0}")]
    Backend(String),
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInfo {
    pub object_name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Byte storage addressed by locator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket every locator of this store embeds.
    fn bucket(&self) -> &str;

    /// Externally reachable locator for `key`.
    fn locator_for(&self, key: &str) -> String;

    /// Store `content` under a fresh `{uuid}.{extension}` key.
    async fn put(
        &self,
        content: &[u8],
        extension: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove the object; `false` when nothing was removed.
    async fn delete(&self, locator: &str) -> Result<bool, StorageError>;

    /// Object metadata, or `None` if the object does not exist.
    async fn stat(&self, locator: &str) -> Result<Option<ObjectInfo>, StorageError>;

    /// Recover the object key from one of this store's locators.
    fn key_from_locator<'a>(&self, locator: &'a str) -> Result<&'a str, StorageError> {
        key_from_locator(locator, self.bucket())
    }
}

/// Generate a fresh object key with the given extension.
pub fn generate_object_key(extension: &str) -> String {
    format!(
        "{}.{}",
        Uuid::new_v4(),
        extension.trim_start_matches('.').to_lowercase()
    )
}

/// Build a locator from its parts.
pub fn object_locator(secure: bool, endpoint: &str, bucket: &str, key: &str) -> String {
    let scheme = if secure { "https" } else { "http" };
    format!(
        "{}://{}/{}/{}",
        scheme,
        endpoint.trim_end_matches('/'),
        bucket,
        key
    )
}

/// Extract the object key following the last `/{bucket}/` segment.
pub fn key_from_locator<'a>(locator: &'a str, bucket: &str) -> Result<&'a str, StorageError> {
    let marker = format!("/{}/", bucket);
    match locator.rsplit_once(marker.as_str()) {
        Some((_, key)) if !key.is_empty() => Ok(key),
        _ => Err(StorageError::InvalidLocator {
            locator: locator.to_string(),
            bucket: bucket.to_string(),
        }),
    }
}
