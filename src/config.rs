//! Configuration management.
//!
//! `Settings` are resolved from built-in defaults, then an optional TOML
//! file (`Config`), then environment variables. `.env` is loaded by the
//! binary before any of this runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::llm::GeminiConfig;
use crate::repository::util::is_postgres_url;
use crate::repository::{DbContext, DieselError};
use crate::storage::{LocalObjectStore, ObjectStore, S3Config, S3ObjectStore, StorageError};

/// Default database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "copilot.db";

/// Subdirectory of the data directory used by the local object store.
pub const OBJECTS_SUBDIR: &str = "objects";

/// Where uploaded files are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible service (MinIO)
    #[default]
    S3,
    /// Directory on the local filesystem
    Local,
}

impl StorageBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s3" | "minio" => Some(Self::S3),
            "local" | "fs" | "filesystem" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database URL; defaults to a SQLite file in `data_dir`.
    pub database_url: Option<String>,
    pub storage_backend: StorageBackend,
    /// Root of the local object store.
    pub storage_dir: PathBuf,
    /// Object store connection (also supplies bucket and external endpoint
    /// to the local backend).
    pub s3: S3Config,
    pub gemini: GeminiConfig,
    /// Address the HTTP server binds to.
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            storage_dir: data_dir.join(OBJECTS_SUBDIR),
            data_dir,
            database_url: None,
            storage_backend: StorageBackend::default(),
            s3: S3Config {
                endpoint: "localhost:9000".to_string(),
                access_key: "minioadmin".to_string(),
                secret_key: "minioadmin".to_string(),
                bucket: "protocols".to_string(),
                secure: false,
                external_endpoint: "localhost:9000".to_string(),
                region: "us-east-1".to_string(),
            },
            gemini: GeminiConfig::base_default(),
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `config_path` if given, then the environment.
    pub async fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = Settings::default();
        if let Some(path) = config_path {
            let config = Config::load_from_path(path).await?;
            let base_dir = config
                .base_dir()
                .unwrap_or_else(|| PathBuf::from("."));
            config.apply_to_settings(&mut settings, &base_dir);
            info!("Loaded configuration from {}", path.display());
        }
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Supported env vars: `DATABASE_URL`, `DATA_DIR`, `STORAGE_BACKEND`,
    /// `STORAGE_DIR`, `MINIO_ENDPOINT`, `MINIO_ACCESS_KEY`, `MINIO_SECRET_KEY`,
    /// `MINIO_BUCKET_NAME`, `MINIO_SECURE`, `MINIO_EXTERNAL_ENDPOINT`,
    /// `MINIO_REGION`, `BIND_ADDRESS`, and the `GEMINI_*` variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DATA_DIR") {
            let dir = PathBuf::from(dir);
            if self.storage_dir == self.data_dir.join(OBJECTS_SUBDIR) {
                self.storage_dir = dir.join(OBJECTS_SUBDIR);
            }
            self.data_dir = dir;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(backend) = lookup("STORAGE_BACKEND").and_then(|b| StorageBackend::from_str(&b)) {
            self.storage_backend = backend;
        }
        if let Some(dir) = lookup("STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(val) = lookup("MINIO_ENDPOINT") {
            self.s3.endpoint = val;
        }
        if let Some(val) = lookup("MINIO_ACCESS_KEY") {
            self.s3.access_key = val;
        }
        if let Some(val) = lookup("MINIO_SECRET_KEY") {
            self.s3.secret_key = val;
        }
        if let Some(val) = lookup("MINIO_BUCKET_NAME") {
            self.s3.bucket = val;
        }
        if let Some(val) = lookup("MINIO_SECURE") {
            self.s3.secure = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Some(val) = lookup("MINIO_EXTERNAL_ENDPOINT") {
            self.s3.external_endpoint = val;
        }
        if let Some(val) = lookup("MINIO_REGION") {
            self.s3.region = val;
        }
        if let Some(val) = lookup("BIND_ADDRESS") {
            self.bind = val;
        }
        self.gemini.apply_env(&lookup);
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}",
                self.data_dir.join(DEFAULT_DATABASE_FILENAME).display()
            ),
        }
    }

    /// Check if using PostgreSQL (vs SQLite).
    pub fn is_postgres(&self) -> bool {
        self.database_url.as_deref().is_some_and(is_postgres_url)
    }

    /// Ensure the data directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })?;
        if self.storage_backend == StorageBackend::Local {
            std::fs::create_dir_all(&self.storage_dir)?;
        }
        Ok(())
    }

    pub fn create_db_context(&self) -> Result<DbContext, DieselError> {
        DbContext::from_url(&self.database_url())
    }

    /// Origin embedded in locators of the local store.
    pub fn public_base_url(&self) -> String {
        let scheme = if self.s3.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.s3.external_endpoint)
    }

    /// Connect the configured object store.
    pub async fn create_object_store(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        match self.storage_backend {
            StorageBackend::S3 => {
                debug!("Using S3 object store at {}", self.s3.endpoint);
                Ok(Arc::new(S3ObjectStore::connect(self.s3.clone()).await?))
            }
            StorageBackend::Local => {
                debug!("Using local object store in {}", self.storage_dir.display());
                Ok(Arc::new(
                    LocalObjectStore::open(
                        &self.storage_dir,
                        &self.s3.bucket,
                        &self.public_base_url(),
                    )
                    .await?,
                ))
            }
        }
    }
}

/// `[storage]` section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<StorageBackend>,
    /// Local store root, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Server bind address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<GeminiConfig>,
    /// Path of the file this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub async fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file values on top of `settings`.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = Self::resolve_path(data_dir, base_dir);
            settings.storage_dir = settings.data_dir.join(OBJECTS_SUBDIR);
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }

        let storage = &self.storage;
        if let Some(backend) = storage.backend {
            settings.storage_backend = backend;
        }
        if let Some(ref dir) = storage.dir {
            settings.storage_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref v) = storage.endpoint {
            settings.s3.endpoint = v.clone();
        }
        if let Some(ref v) = storage.access_key {
            settings.s3.access_key = v.clone();
        }
        if let Some(ref v) = storage.secret_key {
            settings.s3.secret_key = v.clone();
        }
        if let Some(ref v) = storage.bucket {
            settings.s3.bucket = v.clone();
        }
        if let Some(v) = storage.secure {
            settings.s3.secure = v;
        }
        if let Some(ref v) = storage.external_endpoint {
            settings.s3.external_endpoint = v.clone();
        }
        if let Some(ref v) = storage.region {
            settings.s3.region = v.clone();
        }

        if let Some(ref gemini) = self.gemini {
            settings.gemini = gemini.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_minio_conventions() {
        let settings = Settings::default();
        assert_eq!(settings.s3.endpoint, "localhost:9000");
        assert_eq!(settings.s3.bucket, "protocols");
        assert!(!settings.s3.secure);
        assert_eq!(settings.storage_backend, StorageBackend::S3);
        assert_eq!(settings.database_url(), "sqlite:data/copilot.db");
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[
            ("DATABASE_URL", "postgres://lab@db/copilot"),
            ("STORAGE_BACKEND", "local"),
            ("MINIO_SECURE", "TRUE"),
            ("MINIO_EXTERNAL_ENDPOINT", "files.lab.org"),
            ("GEMINI_API_KEY", "abc"),
        ]));
        assert!(settings.is_postgres());
        assert_eq!(settings.storage_backend, StorageBackend::Local);
        assert!(settings.s3.secure);
        assert_eq!(settings.public_base_url(), "https://files.lab.org");
        assert_eq!(settings.gemini.api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_blank_api_key_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[("GEMINI_API_KEY", "  ")]));
        assert!(settings.gemini.api_key.is_none());
    }

    #[test]
    fn test_data_dir_moves_default_storage_dir() {
        let mut settings = Settings::default();
        settings.apply_env(env(&[("DATA_DIR", "/srv/copilot")]));
        assert_eq!(settings.storage_dir, PathBuf::from("/srv/copilot/objects"));

        let mut settings = Settings::default();
        settings.apply_env(env(&[("DATA_DIR", "/srv/copilot"), ("STORAGE_DIR", "/mnt/blobs")]));
        assert_eq!(settings.storage_dir, PathBuf::from("/mnt/blobs"));
    }

    #[test]
    fn test_config_file_applies_relative_paths() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "state"
            bind = "127.0.0.1:9000"

            [storage]
            backend = "local"
            bucket = "uploads"
            "#,
        )
        .unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/etc/copilot"));

        assert_eq!(settings.data_dir, PathBuf::from("/etc/copilot/state"));
        assert_eq!(settings.storage_dir, PathBuf::from("/etc/copilot/state/objects"));
        assert_eq!(settings.storage_backend, StorageBackend::Local);
        assert_eq!(settings.s3.bucket, "uploads");
        assert_eq!(settings.bind, "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copilot.toml");
        std::fs::write(&path, "database_url = \"sqlite:/tmp/x.db\"\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite:/tmp/x.db"));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
    }
}
