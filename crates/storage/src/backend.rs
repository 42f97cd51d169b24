//! Storage backend trait definition
//!
//! Defines the async object-store interface the sync engine drives: flat
//! `/`-separated keys with list/get/put/delete.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sync_core::{Error, Result};

/// Listing entry for a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full object key
    pub key: String,

    /// Object size in bytes
    pub size: u64,

    /// Last modification time, if the backend reports one
    pub last_modified: Option<DateTime<Utc>>,
}

/// Async trait for object storage backends
///
/// Implementors provide the four primitives the sync engine needs, over
/// either a local directory or a remote bucket (S3, etc.).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Read the object stored under `key`
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if no such object exists
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Store `data` under `key`, replacing any existing object
    ///
    /// # Returns
    /// Number of bytes written
    async fn put(&self, key: &str, data: Bytes) -> Result<u64>;

    /// Delete the object under `key`
    ///
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every object whose key starts with `prefix`, sorted by key
    ///
    /// The match is a plain string prefix; pass a trailing `/` to scope the
    /// listing to one "directory".
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
}

/// Reject keys that cannot be mapped onto a filesystem path safely
///
/// Keys must be non-empty, relative, and free of empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidArgument {
        message: format!("invalid object key {:?}: {}", key, reason),
    };

    if key.is_empty() {
        return Err(invalid("empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("absolute"));
    }
    if key.contains('\\') {
        return Err(invalid("backslash"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("empty segment")),
            "." | ".." => return Err(invalid("relative segment")),
            _ => {}
        }
    }
    Ok(())
}
