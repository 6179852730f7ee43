use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lifetime of a presigned upload URL.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

// --- Storage Contract ---

/// StorageService
///
/// Contract for the object storage layer holding avatar and facility images.
/// The S3 client is used against MinIO and Supabase Storage; tests use the mock.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if missing. Only called in `Env::Local`.
    async fn ensure_bucket_exists(&self);

    /// Returns a signed URL the client can `PUT` the file to directly.
    /// The upload is pinned to `content_type` and expires after [`UPLOAD_URL_TTL`].
    ///
    /// # Arguments
    /// * `key`: Object key, normally built by [`avatar_key`].
    /// * `content_type`: MIME type the client declared, e.g. `image/png`.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String>;

    /// Public URL of a stored object.
    fn object_url(&self, key: &str) -> String;
}

// --- S3 Implementation ---

/// S3StorageClient
///
/// AWS SDK client configured with path-style addressing, which MinIO and the
/// Supabase Storage gateway both require.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    endpoint: String,
    bucket_name: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Builds a client from the endpoint and credentials resolved by `AppConfig`.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket already exists.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, String> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL).map_err(|e| e.to_string())?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| e.to_string())?;

        Ok(presigned_req.uri().to_string())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket_name, sanitize_key(key))
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments from a user-provided key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// --- Avatar keys ---

/// avatar_prefix
///
/// Every avatar a user uploads lives below `avatars/{user_id}/`. Profile
/// updates only accept keys under the caller's own prefix.
pub fn avatar_prefix(user_id: Uuid) -> String {
    format!("avatars/{}/", user_id)
}

/// avatar_key
///
/// Fresh object key for one avatar upload, `avatars/{user_id}/{uuid}.{ext}`.
/// The extension is taken from `filename` when it is plain alphanumeric and
/// falls back to `bin`, so nothing from the client's path survives.
pub fn avatar_key(user_id: Uuid, filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");
    format!("{}{}.{}", avatar_prefix(user_id), Uuid::new_v4(), extension)
}

/// is_avatar_key_of
///
/// True when `key` names an object under `user_id`'s avatar prefix and is
/// already in canonical form (no traversal or empty segments).
pub fn is_avatar_key_of(user_id: Uuid, key: &str) -> bool {
    let prefix = avatar_prefix(user_id);
    key.len() > prefix.len() && key.starts_with(&prefix) && sanitize_key(key) == key
}

// --- Test Double ---

/// MockStorageService
///
/// Deterministic in-process storage for tests. Returned URLs point at a fake
/// local bucket and carry a fixed `signature=fake` query.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every upload request fails.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }

    fn object_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }
}

/// StorageState
///
/// Shared handle to the storage layer, held in `AppState`.
pub type StorageState = Arc<dyn StorageService>;
