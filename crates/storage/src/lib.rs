//! Storage - Pluggable object storage backends for checkpoint synchronization
//!
//! Provides async object operations with support for:
//! - Local filesystem directory as a bucket (default feature)
//! - In-memory store for tests and dry runs
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, LocalStorage};
//! use bytes::Bytes;
//!
//! # async fn example() -> sync_core::Result<()> {
//! let storage = LocalStorage::new("/tmp/bucket");
//! storage.put("proj/run1/checkpoints/last.ckpt", Bytes::from(vec![1, 2, 3])).await?;
//! let objects = storage.list("proj/run1/checkpoints/").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use sync_core::{Result, StorageConfig};

mod backend;
mod local;
mod memory;

#[cfg(feature = "s3")]
mod s3;

pub use backend::{validate_key, ObjectMeta, StorageBackend};
pub use local::LocalStorage;
pub use memory::MemoryStorage;

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Storage};

/// Build the backend described by a storage configuration
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::Local { path } => {
            tracing::info!(path = %path.display(), "Using local directory as bucket");
            Ok(Arc::new(LocalStorage::new(path)))
        }
        #[cfg(feature = "s3")]
        StorageConfig::S3 { .. } => {
            let s3_config = S3Config::try_from(config)?;
            tracing::info!(bucket = %s3_config.bucket, "Using S3 bucket");
            Ok(Arc::new(S3Storage::with_config(s3_config).await))
        }
        #[cfg(not(feature = "s3"))]
        StorageConfig::S3 { .. } => Err(sync_core::Error::StorageUnavailable {
            backend: "s3 (built without the `s3` feature)".to_string(),
        }),
    }
}
