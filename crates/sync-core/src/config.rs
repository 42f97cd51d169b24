//! Sync configuration types
//!
//! A run's checkpoints live at `<root>/<project>/<run_id>/<checkpoint_dir_name>`
//! and are mirrored to the same relative key in the bucket. A resumed run reads
//! from the sibling directory named after `load_from_run`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Run identifier used when the host has no experiment tracker
pub const DEFAULT_RUN_ID: &str = "local_run";

/// Default sync interval; checkpoints are large so this is deliberately sparse
pub const DEFAULT_EVERY_N_EPOCHS: u64 = 100;

/// Default name of the checkpoint directory inside a run directory
pub const DEFAULT_CHECKPOINT_DIR_NAME: &str = "checkpoints";

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Project identifier, first path segment under the root
    pub project: String,

    /// Identifier of the current run
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// Prior run to resume from, if any
    #[serde(default)]
    pub load_from_run: Option<String>,

    /// Sync every N epochs
    #[serde(default = "default_every_n_epochs")]
    pub every_n_epochs: u64,

    /// Key derivation root (current working directory if unset)
    #[serde(default)]
    pub root_path: Option<PathBuf>,

    /// Checkpoint directory name inside each run directory
    #[serde(default = "default_checkpoint_dir_name")]
    pub checkpoint_dir_name: String,

    /// Object store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_run_id() -> String {
    DEFAULT_RUN_ID.to_string()
}

fn default_every_n_epochs() -> u64 {
    DEFAULT_EVERY_N_EPOCHS
}

fn default_checkpoint_dir_name() -> String {
    DEFAULT_CHECKPOINT_DIR_NAME.to_string()
}

impl SyncConfig {
    /// Create a configuration for a project with all other fields defaulted
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            run_id: default_run_id(),
            load_from_run: None,
            every_n_epochs: DEFAULT_EVERY_N_EPOCHS,
            root_path: None,
            checkpoint_dir_name: default_checkpoint_dir_name(),
            storage: StorageConfig::default(),
        }
    }

    /// Sets the run identifier.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Sets the run to resume from.
    pub fn with_load_from_run(mut self, run_id: impl Into<String>) -> Self {
        self.load_from_run = Some(run_id.into());
        self
    }

    /// Sets the sync interval.
    pub fn with_every_n_epochs(mut self, every_n_epochs: u64) -> Self {
        self.every_n_epochs = every_n_epochs;
        self
    }

    /// Sets an explicit key derivation root.
    pub fn with_root_path(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_path = Some(root.into());
        self
    }

    /// Sets the object store.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to read config {}: {}", path.display(), e),
        })?;
        let config: SyncConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<()> {
        validate_segment("project", &self.project)?;
        validate_segment("run_id", &self.run_id)?;
        validate_segment("checkpoint_dir_name", &self.checkpoint_dir_name)?;
        if let Some(load) = &self.load_from_run {
            validate_segment("load_from_run", load)?;
        }

        if self.every_n_epochs == 0 {
            return Err(Error::InvalidConfig {
                message: "every_n_epochs must be at least 1".to_string(),
            });
        }

        self.storage.validate()
    }

    /// Key derivation root: the configured path or the current directory
    pub fn resolve_root(&self) -> Result<PathBuf> {
        match &self.root_path {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Directory the current run writes checkpoints into
    pub fn save_dir(&self, root: &Path) -> PathBuf {
        self.run_dir(root, &self.run_id)
    }

    /// Directory a prior run's checkpoints are downloaded into
    pub fn load_dir(&self, root: &Path) -> Option<PathBuf> {
        self.load_from_run
            .as_deref()
            .map(|run_id| self.run_dir(root, run_id))
    }

    fn run_dir(&self, root: &Path, run_id: &str) -> PathBuf {
        root.join(&self.project)
            .join(run_id)
            .join(&self.checkpoint_dir_name)
    }
}

/// Object store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// A local directory standing in for a bucket
    Local { path: PathBuf },

    /// S3-compatible storage
    S3 {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        /// Namespace prepended to every key inside the bucket
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            path: PathBuf::from("./bucket"),
        }
    }
}

impl StorageConfig {
    /// Backend name for logging
    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageConfig::Local { .. } => "local",
            StorageConfig::S3 { .. } => "s3",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::Local { path } if path.as_os_str().is_empty() => {
                Err(Error::InvalidConfig {
                    message: "local storage path must not be empty".to_string(),
                })
            }
            StorageConfig::S3 { bucket, .. } if bucket.trim().is_empty() => {
                Err(Error::InvalidConfig {
                    message: "s3 bucket must not be empty".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Identifiers become single path segments, so they may not contain separators
fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.chars().any(std::path::is_separator)
        || value.contains('/')
    {
        return Err(Error::InvalidConfig {
            message: format!("{} must be a single path segment, got {:?}", field, value),
        });
    }
    Ok(())
}
