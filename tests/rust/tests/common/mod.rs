//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use async_trait::async_trait;
use bytes::Bytes;
use storage::{MemoryStorage, ObjectMeta, StorageBackend};
use sync_core::{Error, Result};

static TRACING: Once = Once::new();

/// Install a test subscriber once per binary; honours `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-memory bucket that counts calls and can fail a chosen `put`
#[derive(Default)]
pub struct FaultyStorage {
    pub inner: MemoryStorage,
    calls: AtomicUsize,
    puts: AtomicUsize,
    /// 1-based index of the put that fails; 0 disables
    fail_put_at: AtomicUsize,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th put from now on (1-based)
    pub fn fail_put_at(&self, n: usize) {
        self.puts.store(0, Ordering::SeqCst);
        self.fail_put_at.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_put_at.store(0, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for FaultyStorage {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_put_at.load(Ordering::SeqCst) {
            return Err(Error::Storage {
                message: format!("injected failure writing {}", key),
            });
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix).await
    }
}

/// Canonical path of a temp dir, so expectations match resolved paths
pub fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Write a file, creating parent directories
pub fn write_file(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
