//! S3-compatible object store (MinIO) over plain REST.
//!
//! Requests use path-style addressing and AWS Signature Version 4.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{generate_object_key, object_locator, ObjectInfo, ObjectStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// `host[:port]` the server talks to.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
    /// `host[:port]` embedded in locators handed to clients.
    pub external_endpoint: String,
    pub region: String,
}

pub struct S3ObjectStore {
    client: reqwest::Client,
    config: S3Config,
}

impl S3ObjectStore {
    pub fn new(config: S3Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create the store and make sure its bucket exists.
    pub async fn connect(config: S3Config) -> Result<Self, StorageError> {
        let store = Self::new(config);
        store.ensure_bucket().await?;
        Ok(store)
    }

    /// Create the bucket if a HEAD request reports it missing.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        let path = format!("/{}", self.config.bucket);
        let response = self.send(Method::HEAD, &path, Vec::new(), None).await?;
        match response.status() {
            s if s.is_success() => {
                info!("Bucket already exists: {}", self.config.bucket);
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                let created = self.send(Method::PUT, &path, Vec::new(), None).await?;
                if !created.status().is_success() {
                    let status = created.status();
                    let body = created.text().await.unwrap_or_default();
                    error!("Error creating bucket: {} {}", status, body);
                    return Err(StorageError::Backend(format!(
                        "cannot create bucket {}: {} {}",
                        self.config.bucket, status, body
                    )));
                }
                info!("Created bucket: {}", self.config.bucket);
                Ok(())
            }
            status => Err(StorageError::Backend(format!(
                "cannot check bucket {}: {}",
                self.config.bucket, status
            ))),
        }
    }

    fn base_url(&self) -> String {
        let scheme = if self.config.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.config.endpoint.trim_end_matches('/'))
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.config.bucket, urlencoding::encode(key))
    }

    /// Send a signed request with an in-memory body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, StorageError> {
        let url = Url::parse(&format!("{}{}", self.base_url(), path))
            .map_err(|e| StorageError::Backend(format!("invalid endpoint: {}", e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(StorageError::Backend(format!(
                    "endpoint has no host: {}",
                    self.config.endpoint
                )))
            }
        };

        let now = Utc::now();
        let payload_hash = hex::encode(Sha256::digest(&body));
        let authorization = sign_request(
            &SigningParams {
                access_key: &self.config.access_key,
                secret_key: &self.config.secret_key,
                region: &self.config.region,
                service: "s3",
            },
            method.as_str(),
            url.path(),
            &host,
            &payload_hash,
            now,
        )?;

        debug!("{} {}", method, url);
        let mut request = self
            .client
            .request(method, url)
            .header("x-amz-date", amz_date(now))
            .header("x-amz-content-sha256", &payload_hash)
            .header("authorization", authorization);
        if let Some(ct) = content_type {
            request = request.header("content-type", ct);
        }
        Ok(request.body(body).send().await?)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn locator_for(&self, key: &str) -> String {
        object_locator(
            self.config.secure,
            &self.config.external_endpoint,
            &self.config.bucket,
            key,
        )
    }

    async fn put(
        &self,
        content: &[u8],
        extension: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = generate_object_key(extension);
        let response = self
            .send(
                Method::PUT,
                &self.object_path(&key),
                content.to_vec(),
                Some(content_type),
            )
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Error uploading file {}: {} {}", key, status, body);
            return Err(StorageError::Upload(format!("{} {}", status, body)));
        }

        info!("Successfully uploaded file: {}", key);
        Ok(self.locator_for(&key))
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key_from_locator(locator)?;
        let response = self
            .send(Method::GET, &self.object_path(key), Vec::new(), None)
            .await?;
        match response.status() {
            s if s.is_success() => {
                let bytes = response.bytes().await?;
                info!("Successfully downloaded file: {}", key);
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Download(format!("{} {}", status, body)))
            }
        }
    }

    async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        let key = self.key_from_locator(locator)?;
        match self
            .send(Method::DELETE, &self.object_path(key), Vec::new(), None)
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Successfully deleted file: {}", key);
                Ok(true)
            }
            Ok(response) => {
                warn!("Error deleting file {}: {}", key, response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Error deleting file {}: {}", key, e);
                Ok(false)
            }
        }
    }

    async fn stat(&self, locator: &str) -> Result<Option<ObjectInfo>, StorageError> {
        let key = self.key_from_locator(locator)?;
        let response = self
            .send(Method::HEAD, &self.object_path(key), Vec::new(), None)
            .await?;
        if !response.status().is_success() {
            if response.status() != StatusCode::NOT_FOUND {
                warn!("Error getting file info for {}: {}", key, response.status());
            }
            return Ok(None);
        }

        let headers = response.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(Some(ObjectInfo {
            object_name: key.to_string(),
            size: header("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            content_type: header("content-type"),
            last_modified: header("last-modified")
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            etag: header("etag").map(|v| v.trim_matches('"').to_string()),
        }))
    }
}

// Signature V4

struct SigningParams<'a> {
    access_key: &'a str,
    secret_key: &'a str,
    region: &'a str,
    service: &'a str,
}

fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Backend(format!("signing key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, StorageError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Build the `Authorization` header for a request without query parameters.
///
/// Signs `host`, `x-amz-content-sha256` and `x-amz-date`.
fn sign_request(
    params: &SigningParams<'_>,
    method: &str,
    canonical_uri: &str,
    host: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> Result<String, StorageError> {
    let amz_date = amz_date(now);
    let date_stamp = now.format("%Y%m%d").to_string();
    let signed_headers = "host;x-amz-content-sha256;x-amz-date";

    let canonical_request = format!(
        "{}\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        method, canonical_uri, host, payload_hash, amz_date, signed_headers, payload_hash
    );
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, params.region, params.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(params.secret_key, &date_stamp, params.region, params.service)?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        params.access_key, scope, signed_headers, signature
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::response::IntoResponse;
    use axum::routing::put;
    use axum::Router;
    use chrono::TimeZone;

    #[test]
    fn test_signing_key_matches_aws_example() {
        // Published derivation example (IAM, us-east-1, 2012-02-15).
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_authorization_header_shape() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let params = SigningParams {
            access_key: "minioadmin",
            secret_key: "minioadmin",
            region: "us-east-1",
            service: "s3",
        };
        let header = sign_request(
            &params,
            "PUT",
            "/protocols/a.pdf",
            "localhost:9000",
            &hex::encode(Sha256::digest(b"")),
            now,
        )
        .unwrap();
        assert!(header.starts_with(
            "AWS4-HMAC-SHA256 Credential=minioadmin/20240501/us-east-1/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let signature = header.rsplit('=').next().unwrap();
        assert_eq!(signature.len(), 64);

        // Deterministic for identical input.
        let again = sign_request(
            &params,
            "PUT",
            "/protocols/a.pdf",
            "localhost:9000",
            &hex::encode(Sha256::digest(b"")),
            now,
        )
        .unwrap();
        assert_eq!(header, again);
    }

    type Objects = Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>;

    #[derive(Clone, Default)]
    struct FakeS3 {
        buckets: Arc<Mutex<Vec<String>>>,
        objects: Objects,
    }

    async fn head_bucket(State(s3): State<FakeS3>, Path(bucket): Path<String>) -> HttpStatus {
        if s3.buckets.lock().unwrap().contains(&bucket) {
            HttpStatus::OK
        } else {
            HttpStatus::NOT_FOUND
        }
    }

    async fn create_bucket(
        State(s3): State<FakeS3>,
        Path(bucket): Path<String>,
        headers: HeaderMap,
    ) -> HttpStatus {
        if !headers.contains_key("authorization") {
            return HttpStatus::FORBIDDEN;
        }
        s3.buckets.lock().unwrap().push(bucket);
        HttpStatus::OK
    }

    async fn put_object(
        State(s3): State<FakeS3>,
        Path((_, key)): Path<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> HttpStatus {
        let ct = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        s3.objects.lock().unwrap().insert(key, (ct, body.to_vec()));
        HttpStatus::OK
    }

    async fn get_object(
        State(s3): State<FakeS3>,
        Path((_, key)): Path<(String, String)>,
    ) -> axum::response::Response {
        match s3.objects.lock().unwrap().get(&key) {
            Some((ct, body)) => (
                [
                    ("content-type", ct.clone()),
                    ("etag", "\"abc123\"".to_string()),
                    ("last-modified", "Wed, 01 May 2024 12:30:00 GMT".to_string()),
                ],
                body.clone(),
            )
                .into_response(),
            None => HttpStatus::NOT_FOUND.into_response(),
        }
    }

    async fn delete_object(
        State(s3): State<FakeS3>,
        Path((_, key)): Path<(String, String)>,
    ) -> HttpStatus {
        s3.objects.lock().unwrap().remove(&key);
        HttpStatus::NO_CONTENT
    }

    async fn spawn_fake_s3(s3: FakeS3) -> String {
        let app = Router::new()
            .route("/:bucket", put(create_bucket).head(head_bucket))
            .route(
                "/:bucket/:key",
                put(put_object).get(get_object).delete(delete_object),
            )
            .with_state(s3);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    fn config(endpoint: &str) -> S3Config {
        S3Config {
            endpoint: endpoint.to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "protocols".to_string(),
            secure: false,
            external_endpoint: "files.lab.local:9000".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_creates_missing_bucket() {
        let fake = FakeS3::default();
        let endpoint = spawn_fake_s3(fake.clone()).await;

        S3ObjectStore::connect(config(&endpoint)).await.unwrap();
        assert_eq!(*fake.buckets.lock().unwrap(), vec!["protocols".to_string()]);

        // Second connect finds it and does not create it again.
        S3ObjectStore::connect(config(&endpoint)).await.unwrap();
        assert_eq!(fake.buckets.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_object_lifecycle() {
        let fake = FakeS3::default();
        let endpoint = spawn_fake_s3(fake.clone()).await;
        let store = S3ObjectStore::connect(config(&endpoint)).await.unwrap();

        let locator = store
            .put(b"\x89PNG data", "png", "image/png")
            .await
            .unwrap();
        assert!(locator.starts_with("http://files.lab.local:9000/protocols/"));
        assert!(locator.ends_with(".png"));

        assert_eq!(store.get(&locator).await.unwrap(), b"\x89PNG data");

        let info = store.stat(&locator).await.unwrap().unwrap();
        assert_eq!(info.content_type.as_deref(), Some("image/png"));
        assert_eq!(info.etag.as_deref(), Some("abc123"));
        assert!(info.last_modified.is_some());

        assert!(store.delete(&locator).await.unwrap());
        assert!(store.stat(&locator).await.unwrap().is_none());
        assert!(matches!(
            store.get(&locator).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
