//! S3 storage backend
//!
//! Provides async S3-compatible storage with:
//! - Multipart uploads for large checkpoints
//! - Exponential backoff retry logic
//! - Custom endpoint support (for MinIO, LocalStack, etc.)
//! - An optional namespace inside the bucket

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::Builder as S3ConfigBuilder,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sync_core::{Error, Result, StorageConfig};
use tracing::{debug, instrument, warn};

use crate::{ObjectMeta, StorageBackend};

/// Threshold for switching to multipart upload (5 MB)
const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Part size for multipart uploads (8 MB; S3 requires at least 5 MB)
const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff when the error carries no hint (milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 100;

/// Backoff before retrying `attempt` (0-based), scaled from the error's hint
fn retry_delay(error: &Error, attempt: u32) -> Duration {
    let base = error.retry_delay_hint_ms().unwrap_or(BASE_RETRY_DELAY_MS);
    Duration::from_millis(base.saturating_mul(1 << attempt))
}

/// S3-compatible storage backend
///
/// Supports Amazon S3 and S3-compatible services like MinIO.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    namespace: String,
}

/// Configuration for S3Storage
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Optional namespace prepended to every key (e.g., "team-a/")
    pub prefix: Option<String>,
    /// Optional custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// AWS region (default: "us-east-1")
    pub region: Option<String>,
    /// Force path-style addressing (required for MinIO)
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: None,
            endpoint_url: None,
            region: Some("us-east-1".to_string()),
            force_path_style: false,
        }
    }
}

impl TryFrom<&StorageConfig> for S3Config {
    type Error = Error;

    fn try_from(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::S3 {
                bucket,
                region,
                endpoint,
                prefix,
                force_path_style,
            } => Ok(S3Config {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
                endpoint_url: endpoint.clone(),
                region: region.clone().or_else(|| Some("us-east-1".to_string())),
                force_path_style: *force_path_style,
            }),
            other => Err(Error::InvalidConfig {
                message: format!("expected s3 storage, got {}", other.backend_name()),
            }),
        }
    }
}

/// Join the bucket namespace and an object key
fn join_namespace(namespace: &str, key: &str) -> String {
    let namespace = namespace.trim_end_matches('/');
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", namespace, key)
    }
}

/// Strip the bucket namespace from a listed key
fn strip_namespace<'a>(namespace: &str, key: &'a str) -> &'a str {
    let namespace = namespace.trim_end_matches('/');
    if namespace.is_empty() {
        return key;
    }
    key.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
}

impl S3Storage {
    /// Create a new S3Storage with default AWS configuration
    ///
    /// Uses environment variables or instance profile for credentials.
    pub async fn new(bucket: impl Into<String>) -> Self {
        Self::with_config(S3Config {
            bucket: bucket.into(),
            ..Default::default()
        })
        .await
    }

    /// Create a new S3Storage with custom configuration
    pub async fn with_config(config: S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(
                config.region.unwrap_or_else(|| "us-east-1".to_string()),
            ))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self {
            client,
            bucket: config.bucket,
            namespace: config.prefix.unwrap_or_default(),
        }
    }

    /// Create S3Storage for MinIO (convenience constructor)
    pub async fn minio(endpoint: &str, bucket: &str) -> Self {
        Self::with_config(S3Config {
            bucket: bucket.to_string(),
            endpoint_url: Some(endpoint.to_string()),
            force_path_style: true,
            ..Default::default()
        })
        .await
    }

    /// Bucket this backend writes to
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    let delay = retry_delay(&e, attempt);
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Storage {
            message: format!("{} failed after {} retries", operation, MAX_RETRIES),
        }))
    }

    /// Perform multipart upload for large checkpoints
    async fn multipart_upload(&self, key: &str, data: Bytes) -> Result<u64> {
        let size = data.len() as u64;

        let create_result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to initiate multipart upload: {}", e),
            })?;

        let upload_id = create_result.upload_id().ok_or_else(|| Error::Storage {
            message: "No upload_id returned".to_string(),
        })?;

        debug!(key, upload_id, size, "Started multipart upload");

        let mut completed_parts = Vec::new();
        for (index, chunk_start) in (0..data.len()).step_by(MULTIPART_PART_SIZE).enumerate() {
            let chunk_end = std::cmp::min(chunk_start + MULTIPART_PART_SIZE, data.len());
            let part_number = index as i32 + 1;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.slice(chunk_start..chunk_end)))
                .send()
                .await;

            let uploaded = match uploaded {
                Ok(output) => output,
                Err(e) => {
                    self.abort_multipart_upload(key, upload_id);
                    return Err(Error::Storage {
                        message: format!("Failed to upload part {}: {}", part_number, e),
                    });
                }
            };

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(String::from))
                    .build(),
            );

            debug!(part_number, chunk_start, chunk_end, "Uploaded part");
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to complete multipart upload: {}", e),
            })?;

        debug!(key, size, "Completed multipart upload");
        Ok(size)
    }

    /// Abort a multipart upload (best effort, for cleanup)
    fn abort_multipart_upload(&self, key: &str, upload_id: &str) {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = key.to_string();
        let upload_id = upload_id.to_string();

        tokio::spawn(async move {
            let _ = client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await;
        });
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let full_key = join_namespace(&self.namespace, key);
        debug!(%full_key, "Reading from S3");

        self.with_retry("get", || async {
            let result = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| {
                    let missing = e
                        .as_service_error()
                        .map(|se| se.is_no_such_key())
                        .unwrap_or(false);
                    if missing {
                        Error::StoragePathNotFound {
                            path: key.to_string(),
                        }
                    } else {
                        Error::Storage {
                            message: format!("S3 get_object failed: {}", e),
                        }
                    }
                })?;

            let bytes = result.body.collect().await.map_err(|e| Error::Storage {
                message: format!("Failed to read S3 response body: {}", e),
            })?;

            Ok(bytes.into_bytes())
        })
        .await
    }

    #[instrument(skip(self, data), fields(backend = "s3", bucket = %self.bucket, size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<u64> {
        let full_key = join_namespace(&self.namespace, key);
        let size = data.len();
        debug!(%full_key, size, "Writing to S3");

        if size > MULTIPART_THRESHOLD {
            return self.multipart_upload(&full_key, data).await;
        }

        self.with_retry("put", || {
            let data = data.clone();
            let full_key = full_key.clone();
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&full_key)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| Error::Storage {
                        message: format!("S3 put_object failed: {}", e),
                    })?;

                Ok(size as u64)
            }
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = join_namespace(&self.namespace, key);
        debug!(%full_key, "Deleting from S3");

        // delete_object succeeds for missing keys
        self.with_retry("delete", || async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| Error::Storage {
                    message: format!("S3 delete_object failed: {}", e),
                })?;

            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let s3_prefix = join_namespace(&self.namespace, prefix);
        debug!(%s3_prefix, "Listing S3 objects");

        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&s3_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| Error::Storage {
                message: format!("S3 list_objects failed: {}", e),
            })?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    results.push(ObjectMeta {
                        key: strip_namespace(&self.namespace, key).to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                        last_modified: object
                            .last_modified()
                            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(count = results.len(), "Found S3 objects");
        Ok(results)
    }
}
