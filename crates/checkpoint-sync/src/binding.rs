//! Local directory to remote prefix bindings

use std::path::{Path, PathBuf};

use sync_core::{Error, Result};

use crate::keymap::{derive_key, KeyMapper};

/// A local directory paired with the remote key derived from it
///
/// The key is computed once when the binding is created; later changes to
/// the directory's contents never move it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBinding {
    local_dir: PathBuf,
    remote_key: String,
}

impl SyncBinding {
    /// Bind an existing directory under the mapper's root
    pub fn new(mapper: &KeyMapper, local_dir: &Path) -> Result<Self> {
        let local_dir = mapper.resolve(local_dir)?;
        let remote_key = derive_key(mapper.root(), &local_dir)?;

        // An empty key would scope the binding to the whole bucket
        if remote_key.is_empty() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "sync directory {} must be below the root, not the root itself",
                    local_dir.display()
                ),
            });
        }

        Ok(Self {
            local_dir,
            remote_key,
        })
    }

    /// Resolved local directory
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Remote key of the directory itself
    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    /// Prefix every owned object key starts with: `remote_key/`
    pub fn prefix(&self) -> String {
        format!("{}/", self.remote_key)
    }

    /// Key of a file directly inside the bound directory
    pub fn object_key(&self, filename: &str) -> String {
        format!("{}/{}", self.remote_key, filename)
    }

    /// Whether `key` lies in this binding's namespace
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(&self.remote_key)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| !rest.is_empty())
            .unwrap_or(false)
    }
}

/// Check a bare filename for the single-file operations
///
/// Rejects empty names, `.`/`..` and anything containing a path separator.
pub fn validate_filename(filename: &str) -> Result<()> {
    let has_separator = filename.contains('/') || filename.chars().any(std::path::is_separator);
    if filename.is_empty() || filename == "." || filename == ".." || has_separator {
        return Err(Error::InvalidArgument {
            message: format!("expected a bare filename, got {:?}", filename),
        });
    }
    Ok(())
}

/// Last `/`-separated segment of an object key
pub fn key_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
