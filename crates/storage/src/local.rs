//! Local filesystem storage backend
//!
//! Treats a directory as a bucket: object keys map to relative file paths.
//! Writes are atomic so a crashed upload never leaves a torn object behind.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sync_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::backend::validate_key;
use crate::{ObjectMeta, StorageBackend};

/// Directory under the base path that holds in-flight writes
///
/// Keys whose first segment is this name are rejected, so staged files never
/// show up as objects.
pub const STAGING_DIR: &str = ".ckptsync-staging";

/// Local filesystem storage backend
///
/// Stores objects in a local directory with support for:
/// - Atomic writes (stage under [`STAGING_DIR`], then rename)
/// - Automatic directory creation
/// - Pruning of directories emptied by deletes
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Directory acting as the bucket
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Directory to use as the storage root
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a validated key to a file path
    fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        if key.split('/').next() == Some(STAGING_DIR) {
            return Err(Error::InvalidArgument {
                message: format!("object key {:?} uses the reserved {} directory", key, STAGING_DIR),
            });
        }
        Ok(key
            .split('/')
            .fold(self.base_path.clone(), |path, segment| path.join(segment)))
    }

    fn staging_dir(&self) -> PathBuf {
        self.base_path.join(STAGING_DIR)
    }

    /// Generate a unique staging path on the same filesystem as every object
    fn temp_path(&self) -> PathBuf {
        self.staging_dir().join(format!("{}.tmp", Uuid::new_v4()))
    }

    /// Convert a path under the base directory back into an object key
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(s) => segments.push(s.to_str()?.to_string()),
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }

    /// Remove directories emptied by a delete, stopping at the base path
    async fn prune_empty_parents(&self, full_path: &Path) {
        let mut current = full_path.parent();
        while let Some(dir) = current {
            if dir == self.base_path || !dir.starts_with(&self.base_path) {
                break;
            }
            // Fails on non-empty directories, which ends the walk
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let full_path = self.resolve_path(key)?;
        debug!(?full_path, "Reading object");

        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: key.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to read {}: {}", key, e),
            }),
        }
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<u64> {
        let full_path = self.resolve_path(key)?;
        let temp_path = self.temp_path();
        let size = data.len() as u64;

        debug!(?full_path, ?temp_path, size, "Writing object atomically");

        let staging = self.staging_dir();
        for dir in full_path.parent().into_iter().chain([staging.as_path()]) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Storage {
                    message: format!("Failed to create directory {:?}: {}", dir, e),
                })?;
        }

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create temp file {:?}: {}", temp_path, e),
            })?;

        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write data: {}", e),
        })?;

        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync file: {}", e),
        })?;

        drop(file);

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, full_path, e),
            });
        }

        Ok(size)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.resolve_path(key)?;
        debug!(?full_path, "Deleting object");

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                self.prune_empty_parents(&full_path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to delete {}: {}", key, e),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut results = Vec::new();

        // Narrow the walk to the deepest directory the prefix fully names
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let dir_to_scan = dir_part
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.base_path.clone(), |path, segment| path.join(segment));

        debug!(?dir_to_scan, prefix, "Listing objects with prefix");

        if !fs::metadata(&dir_to_scan)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Ok(results);
        }

        let staging = self.staging_dir();
        if dir_to_scan.starts_with(&staging) {
            return Ok(results);
        }
        let mut stack = vec![dir_to_scan];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| Error::Storage {
                message: format!("Failed to list {:?}: {}", dir, e),
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Storage {
                message: format!("Failed to list {:?}: {}", dir, e),
            })? {
                let entry_path = entry.path();
                let metadata = entry.metadata().await.map_err(|e| Error::Storage {
                    message: format!("Failed to stat {:?}: {}", entry_path, e),
                })?;

                if metadata.is_dir() {
                    if entry_path != staging {
                        stack.push(entry_path);
                    }
                    continue;
                }
                if !metadata.is_file() {
                    continue;
                }

                if let Some(key) = self.key_for(&entry_path) {
                    if key.starts_with(prefix) {
                        results.push(ObjectMeta {
                            key,
                            size: metadata.len(),
                            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                        });
                    }
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(count = results.len(), "Found objects");
        Ok(results)
    }
}
