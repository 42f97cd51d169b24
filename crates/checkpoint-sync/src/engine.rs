//! Checkpoint directory sync engine
//!
//! Mirrors a run's save directory to its remote prefix with replace
//! semantics (clear the prefix, then upload every file) and pulls a prior
//! run's prefix into a flat load directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use storage::StorageBackend;
use sync_core::{Error, Result, SyncDirection, SyncReport, SyncState};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::binding::{key_basename, validate_filename, SyncBinding};
use crate::keymap::{derive_key, KeyMapper};
use crate::rotation::apply_rotation_rewrite;

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Key derivation root (current working directory if unset)
    pub root_path: Option<PathBuf>,

    /// Directory published on upload
    pub save_dir: PathBuf,

    /// Directory a prior run is downloaded into
    pub load_dir: Option<PathBuf>,
}

impl SyncEngineConfig {
    /// Configuration with only a save directory
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_path: None,
            save_dir: save_dir.into(),
            load_dir: None,
        }
    }

    /// Sets the key derivation root.
    pub fn with_root_path(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_path = Some(root.into());
        self
    }

    /// Sets the load directory.
    pub fn with_load_dir(mut self, load_dir: impl Into<PathBuf>) -> Self {
        self.load_dir = Some(load_dir.into());
        self
    }
}

/// Synchronizes a save directory and an optional load directory with an
/// object store
///
/// One transfer runs at a time; a call made while another is in flight
/// fails with [`Error::SyncInProgress`].
pub struct SyncEngine {
    /// Object store
    storage: Arc<dyn StorageBackend>,

    /// Path to key mapping anchored at the root
    mapper: KeyMapper,

    /// Published directory
    save: SyncBinding,

    /// Directory restored from a prior run
    load: Option<SyncBinding>,

    /// Held for the duration of every transfer
    gate: Mutex<()>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("backend", &self.storage.name())
            .field("root", &self.mapper.root())
            .field("save", &self.save)
            .field("load", &self.load)
            .finish()
    }
}

impl SyncEngine {
    /// Create a sync engine, creating the save and load directories
    ///
    /// Fails without creating anything if either directory lies outside the
    /// root.
    pub async fn new(storage: Arc<dyn StorageBackend>, config: SyncEngineConfig) -> Result<Self> {
        let root = match config.root_path {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let mapper = KeyMapper::new(&root)?;

        let save = Self::bind(&mapper, &config.save_dir).await?;
        let load = match &config.load_dir {
            Some(dir) => Some(Self::bind(&mapper, dir).await?),
            None => None,
        };

        info!(
            backend = storage.name(),
            save_key = %save.remote_key(),
            load_key = load.as_ref().map(|b| b.remote_key()).unwrap_or("<none>"),
            "Initialised checkpoint sync"
        );

        Ok(Self {
            storage,
            mapper,
            save,
            load,
            gate: Mutex::new(()),
        })
    }

    async fn bind(mapper: &KeyMapper, dir: &Path) -> Result<SyncBinding> {
        // Resolve through existing symlinks before creating anything on disk
        let resolved = mapper.resolve(dir)?;
        derive_key(mapper.root(), &resolved)?;
        fs::create_dir_all(&resolved).await?;
        SyncBinding::new(mapper, &resolved)
    }

    /// Canonical key derivation root
    pub fn root(&self) -> &Path {
        self.mapper.root()
    }

    /// Save-side binding
    pub fn save_binding(&self) -> &SyncBinding {
        &self.save
    }

    /// Load-side binding, if configured
    pub fn load_binding(&self) -> Option<&SyncBinding> {
        self.load.as_ref()
    }

    /// Whether a transfer is currently running
    pub fn state(&self) -> SyncState {
        match self.gate.try_lock() {
            Ok(_) => SyncState::Idle,
            Err(_) => SyncState::Syncing,
        }
    }

    fn enter(&self) -> Result<MutexGuard<'_, ()>> {
        self.gate.try_lock().map_err(|_| Error::SyncInProgress)
    }

    /// Replace the remote prefix with the save directory's current contents
    ///
    /// Clears the prefix, folds `last-v1.ckpt` into `last.ckpt`, then uploads
    /// every regular file under the save directory. Any failure aborts the
    /// run; the next successful upload starts from a cleared prefix again.
    #[instrument(skip(self), fields(remote_key = %self.save.remote_key()))]
    pub async fn upload(&self) -> Result<SyncReport> {
        let _guard = self.enter()?;
        let started = Instant::now();
        let mut report = SyncReport::new(SyncDirection::Upload, self.save.remote_key());

        report.deleted = self.clear_remote(&self.save).await?;
        report.rotated = apply_rotation_rewrite(self.save.local_dir()).await?;

        let files = list_local_files(self.save.local_dir()).await?;
        for file in files {
            let key = derive_key(self.mapper.root(), &file)?;
            if !self.save.owns(&key) {
                return Err(Error::Internal {
                    message: format!("derived key {} escapes {}", key, self.save.prefix()),
                });
            }

            let data = fs::read(&file).await?;
            let size = self.storage.put(&key, Bytes::from(data)).await?;
            debug!(%key, size, "Uploaded checkpoint file");
            report.record_transfer(size);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            deleted = report.deleted,
            uploaded = report.transferred,
            bytes = report.bytes,
            rotated = report.rotated,
            elapsed_ms = report.elapsed_ms,
            "Upload complete"
        );
        Ok(report)
    }

    /// Copy every object under the load prefix into the load directory
    ///
    /// Only the last key segment is kept, so nested keys land flat in the
    /// load directory. Existing files are overwritten; when two keys share a
    /// basename the one listed last wins.
    #[instrument(skip(self))]
    pub async fn download(&self) -> Result<SyncReport> {
        let load = self.load.as_ref().ok_or(Error::NoLoadBinding)?;
        let _guard = self.enter()?;
        let started = Instant::now();
        let mut report = SyncReport::new(SyncDirection::Download, load.remote_key());

        fs::create_dir_all(load.local_dir()).await?;

        for object in self.storage.list(&load.prefix()).await? {
            if !load.owns(&object.key) {
                warn!(key = %object.key, "Skipping object outside load prefix");
                continue;
            }
            let filename = key_basename(&object.key);
            if validate_filename(filename).is_err() {
                debug!(key = %object.key, "Skipping key without a file name");
                continue;
            }

            let data = self.storage.get(&object.key).await?;
            write_file_atomic(&load.local_dir().join(filename), &data).await?;
            debug!(key = %object.key, filename, size = data.len(), "Downloaded checkpoint file");
            report.record_transfer(data.len() as u64);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            remote_key = %load.remote_key(),
            downloaded = report.transferred,
            bytes = report.bytes,
            elapsed_ms = report.elapsed_ms,
            "Download complete"
        );
        Ok(report)
    }

    /// Upload one file from the save directory to `<save key>/<filename>`
    ///
    /// Leaves the rest of the prefix untouched.
    #[instrument(skip(self))]
    pub async fn upload_named(&self, filename: &str) -> Result<u64> {
        validate_filename(filename)?;
        let _guard = self.enter()?;

        let path = self.save.local_dir().join(filename);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CheckpointNotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let key = self.save.object_key(filename);
        let size = self.storage.put(&key, Bytes::from(data)).await?;
        info!(%key, size, "Uploaded checkpoint file");
        Ok(size)
    }

    /// Download `<load key>/<filename>` into the load directory
    #[instrument(skip(self))]
    pub async fn download_named(&self, filename: &str) -> Result<u64> {
        validate_filename(filename)?;
        let load = self.load.as_ref().ok_or(Error::NoLoadBinding)?;
        let _guard = self.enter()?;

        fs::create_dir_all(load.local_dir()).await?;
        let key = load.object_key(filename);
        let data = self.storage.get(&key).await?;
        write_file_atomic(&load.local_dir().join(filename), &data).await?;
        info!(%key, size = data.len(), "Downloaded checkpoint file");
        Ok(data.len() as u64)
    }

    /// Local path of a downloaded checkpoint, for resuming training
    pub fn resume_checkpoint_path(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        let load = self.load.as_ref().ok_or(Error::NoLoadBinding)?;
        let path = load.local_dir().join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::CheckpointNotFound {
                path: path.display().to_string(),
            })
        }
    }

    /// Delete every object under the binding's prefix
    async fn clear_remote(&self, binding: &SyncBinding) -> Result<usize> {
        let objects = self.storage.list(&binding.prefix()).await?;
        let mut deleted = 0;
        for object in objects {
            if !binding.owns(&object.key) {
                warn!(key = %object.key, "Skipping object outside save prefix");
                continue;
            }
            self.storage.delete(&object.key).await?;
            debug!(key = %object.key, "Deleted remote object");
            deleted += 1;
        }
        Ok(deleted)
    }
}

/// Regular files under `dir`, recursively, in a stable order
///
/// Symlinks are not followed.
async fn list_local_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| Error::Internal {
        message: format!("file enumeration task failed: {}", e),
    })?
}

/// Write via a temp file in the same directory, then rename over the target
async fn write_file_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    ));

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
