//! In-memory storage backend
//!
//! A bucket held in a `BTreeMap`, for tests and dry runs. Clones share the
//! same contents.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sync_core::{Error, Result};
use tracing::{debug, instrument};

use crate::backend::validate_key;
use crate::{ObjectMeta, StorageBackend};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory storage backend
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All keys in order
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Copy of every key and payload
    pub fn snapshot(&self) -> BTreeMap<String, Bytes> {
        self.objects
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.data.clone()))
            .collect()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::StoragePathNotFound {
                path: key.to_string(),
            })
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<u64> {
        validate_key(key)?;
        let size = data.len() as u64;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        debug!(key, size, "Stored object");
        Ok(size)
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read();
        let results: Vec<ObjectMeta> = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
            })
            .collect();
        debug!(count = results.len(), "Found objects");
        Ok(results)
    }
}
