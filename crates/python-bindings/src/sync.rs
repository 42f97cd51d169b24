//! Checkpoint sync Python bindings
//!
//! Wraps the async engine with synchronous Python methods. Every call
//! releases the GIL while it blocks on the owned runtime.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use checkpoint_sync::SyncCallback;
use pyo3::exceptions::{PyFileNotFoundError, PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use sync_core::{Error, StorageConfig, SyncConfig, DEFAULT_RESUME_FILENAME};
use tokio::runtime::Runtime;

fn to_py_err(e: Error) -> PyErr {
    match e {
        Error::InvalidArgument { .. }
        | Error::InvalidConfig { .. }
        | Error::PathNotUnderRoot { .. } => PyValueError::new_err(e.to_string()),
        Error::CheckpointNotFound { .. } | Error::StoragePathNotFound { .. } => {
            PyFileNotFoundError::new_err(e.to_string())
        }
        e if e.is_transport() => PyIOError::new_err(e.to_string()),
        e => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Summary of a completed upload or download
#[pyclass]
#[derive(Clone)]
pub struct SyncReport {
    /// "upload" or "download"
    #[pyo3(get)]
    pub direction: String,

    /// Remote key that was synced
    #[pyo3(get)]
    pub remote_key: String,

    /// Remote objects deleted before re-publishing
    #[pyo3(get)]
    pub deleted: usize,

    /// Files transferred
    #[pyo3(get)]
    pub transferred: usize,

    /// Payload bytes transferred
    #[pyo3(get)]
    pub bytes: u64,

    /// Whether last-v1.ckpt was folded into last.ckpt
    #[pyo3(get)]
    pub rotated: bool,

    /// Start timestamp (ISO 8601 string)
    #[pyo3(get)]
    pub started_at: String,

    /// Duration in milliseconds
    #[pyo3(get)]
    pub elapsed_ms: u64,
}

impl From<sync_core::SyncReport> for SyncReport {
    fn from(report: sync_core::SyncReport) -> Self {
        let direction = match report.direction {
            sync_core::SyncDirection::Upload => "upload",
            sync_core::SyncDirection::Download => "download",
        };
        Self {
            direction: direction.to_string(),
            remote_key: report.remote_key,
            deleted: report.deleted,
            transferred: report.transferred,
            bytes: report.bytes,
            rotated: report.rotated,
            started_at: report.started_at.to_rfc3339(),
            elapsed_ms: report.elapsed_ms,
        }
    }
}

#[pymethods]
impl SyncReport {
    fn __repr__(&self) -> String {
        format!(
            "SyncReport(direction='{}', key='{}', transferred={}, bytes={}, deleted={})",
            self.direction, self.remote_key, self.transferred, self.bytes, self.deleted
        )
    }
}

/// Mirrors a run's checkpoint directory to a bucket
///
/// Checkpoints live in `<root>/<project>/<run_id>/checkpoints` and are
/// published under the same key. With `load_from_run`, the prior run's
/// checkpoints are downloaded during construction.
///
/// Example:
///     sync = CheckpointSync("proj", local_bucket="/mnt/bucket", every_n_epochs=5)
///
///     # From the training loop
///     sync.on_train_epoch_end(epoch)
///     sync.on_train_end()
#[pyclass]
pub struct CheckpointSync {
    inner: Arc<SyncCallback>,
    runtime: Arc<Runtime>,
}

impl CheckpointSync {
    /// Block on `fut` with the GIL released
    fn block_on<T, F>(&self, py: Python<'_>, fut: F) -> PyResult<T>
    where
        T: Send,
        F: Future<Output = sync_core::Result<T>> + Send,
    {
        py.allow_threads(|| self.runtime.block_on(fut))
            .map_err(to_py_err)
    }
}

#[pymethods]
impl CheckpointSync {
    /// Create a checkpoint sync for a run
    ///
    /// Args:
    ///     project: Project name, first path segment under the root
    ///     bucket: S3 bucket (mutually exclusive with local_bucket)
    ///     local_bucket: Local directory used as the bucket
    ///     run_id: Current run identifier (default: "local_run")
    ///     load_from_run: Prior run to download and resume from
    ///     every_n_epochs: Upload interval (default: 100)
    ///     root_path: Key derivation root (default: current directory)
    ///     region: S3 region
    ///     endpoint_url: Custom S3 endpoint
    #[new]
    #[pyo3(signature = (
        project,
        bucket=None,
        local_bucket=None,
        run_id=None,
        load_from_run=None,
        every_n_epochs=100,
        root_path=None,
        region=None,
        endpoint_url=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        py: Python<'_>,
        project: &str,
        bucket: Option<String>,
        local_bucket: Option<String>,
        run_id: Option<String>,
        load_from_run: Option<String>,
        every_n_epochs: u64,
        root_path: Option<String>,
        region: Option<String>,
        endpoint_url: Option<String>,
    ) -> PyResult<Self> {
        let mut config = SyncConfig::new(project).with_every_n_epochs(every_n_epochs);
        if let Some(run_id) = run_id {
            config = config.with_run_id(run_id);
        }
        if let Some(load) = load_from_run {
            config = config.with_load_from_run(load);
        }
        if let Some(root) = root_path {
            config = config.with_root_path(root);
        }

        config.storage = match (bucket, local_bucket) {
            (Some(_), Some(_)) => {
                return Err(PyValueError::new_err(
                    "bucket and local_bucket are mutually exclusive",
                ))
            }
            (Some(bucket), None) => StorageConfig::S3 {
                bucket,
                region,
                force_path_style: endpoint_url.is_some(),
                endpoint: endpoint_url,
                prefix: None,
            },
            (None, Some(path)) => StorageConfig::Local {
                path: PathBuf::from(path),
            },
            (None, None) => StorageConfig::default(),
        };

        // Create tokio runtime for async operations
        let runtime = Runtime::new().map_err(|e| {
            PyRuntimeError::new_err(format!("Failed to create async runtime: {}", e))
        })?;

        let inner = py
            .allow_threads(|| runtime.block_on(checkpoint_sync::connect(&config)))
            .map_err(to_py_err)?;

        Ok(Self {
            inner: Arc::new(inner),
            runtime: Arc::new(runtime),
        })
    }

    /// Remote key of the save directory
    #[getter]
    fn save_key(&self) -> String {
        self.inner.engine().save_binding().remote_key().to_string()
    }

    /// Remote key of the load directory, if resuming
    #[getter]
    fn load_key(&self) -> Option<String> {
        self.inner
            .engine()
            .load_binding()
            .map(|b| b.remote_key().to_string())
    }

    /// Replace the remote prefix with the save directory
    fn upload(&self, py: Python<'_>) -> PyResult<SyncReport> {
        let inner = self.inner.clone();
        self.block_on(py, async move { inner.engine().upload().await })
            .map(SyncReport::from)
    }

    /// Download the prior run's checkpoints into the load directory
    fn download(&self, py: Python<'_>) -> PyResult<SyncReport> {
        let inner = self.inner.clone();
        self.block_on(py, async move { inner.engine().download().await })
            .map(SyncReport::from)
    }

    /// Upload a single file from the save directory
    ///
    /// Returns:
    ///     Bytes uploaded
    fn upload_file(&self, py: Python<'_>, filename: String) -> PyResult<u64> {
        let inner = self.inner.clone();
        self.block_on(py, async move { inner.engine().upload_named(&filename).await })
    }

    /// Download a single file into the load directory
    ///
    /// Returns:
    ///     Bytes downloaded
    fn download_file(&self, py: Python<'_>, filename: String) -> PyResult<u64> {
        let inner = self.inner.clone();
        self.block_on(py, async move { inner.engine().download_named(&filename).await })
    }

    /// Epoch-end hook; uploads on interval boundaries
    ///
    /// Returns:
    ///     SyncReport if an upload ran, otherwise None
    #[pyo3(signature = (epoch=None))]
    fn on_train_epoch_end(&self, py: Python<'_>, epoch: Option<u64>) -> PyResult<Option<SyncReport>> {
        let inner = self.inner.clone();
        self.block_on(py, async move { inner.on_train_epoch_end(epoch).await })
            .map(|report| report.map(SyncReport::from))
    }

    /// Train-end hook; uploads unless the policy declines the final sync
    ///
    /// Returns:
    ///     SyncReport if an upload ran, otherwise None
    fn on_train_end(&self, py: Python<'_>) -> PyResult<Option<SyncReport>> {
        let inner = self.inner.clone();
        self.block_on(py, async move { inner.on_train_end().await })
            .map(|report| report.map(SyncReport::from))
    }

    /// Local path of a downloaded checkpoint to resume from
    #[pyo3(signature = (filename=DEFAULT_RESUME_FILENAME))]
    fn resume_path(&self, filename: &str) -> PyResult<String> {
        self.inner
            .engine()
            .resume_checkpoint_path(filename)
            .map(|path| path.display().to_string())
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "CheckpointSync(save_key='{}', load_key={:?})",
            self.save_key(),
            self.load_key()
        )
    }
}
