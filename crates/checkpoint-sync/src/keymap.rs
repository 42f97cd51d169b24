//! Path to object-key mapping
//!
//! A key is the `/`-joined path of a file relative to the configured root,
//! so `<root>/proj/run1/checkpoints/last.ckpt` maps to
//! `proj/run1/checkpoints/last.ckpt` on every platform.

use std::path::{Component, Path, PathBuf};

use sync_core::{Error, Result};

/// Derive the object key for `target` relative to `root`
///
/// Both paths must be absolute. `.` and `..` are resolved lexically; no
/// filesystem access happens here. Symlinks must already be resolved by the
/// caller (see [`KeyMapper::resolve`]). `target == root` yields an empty key.
pub fn derive_key(root: &Path, target: &Path) -> Result<String> {
    if !root.is_absolute() || !target.is_absolute() {
        return Err(Error::InvalidArgument {
            message: format!(
                "key derivation needs absolute paths, got root {} and target {}",
                root.display(),
                target.display()
            ),
        });
    }

    let root = normalize_lexically(root);
    let target = normalize_lexically(target);

    let relative = target
        .strip_prefix(&root)
        .map_err(|_| Error::PathNotUnderRoot {
            path: target.display().to_string(),
            root: root.display().to_string(),
        })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| Error::InvalidArgument {
                    message: format!("path {} is not valid UTF-8", target.display()),
                })?;
                segments.push(segment);
            }
            // normalize_lexically leaves only normal components below the root
            _ => {
                return Err(Error::Internal {
                    message: format!("unexpected component in {}", relative.display()),
                })
            }
        }
    }

    Ok(segments.join("/"))
}

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` never climbs above the filesystem root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let cannot_pop = matches!(
                    normalized.components().next_back(),
                    None | Some(Component::RootDir)
                        | Some(Component::Prefix(_))
                        | Some(Component::ParentDir)
                );
                if cannot_pop {
                    if !path.is_absolute() {
                        normalized.push("..");
                    }
                } else {
                    normalized.pop();
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Maps local paths to object keys under a fixed root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapper {
    root: PathBuf,
}

impl KeyMapper {
    /// Create a mapper for an existing root directory
    ///
    /// The root is canonicalized once here; it never changes afterwards.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|e| Error::InvalidConfig {
            message: format!("root path {} is not usable: {}", root.display(), e),
        })?;
        if !canonical.is_dir() {
            return Err(Error::InvalidConfig {
                message: format!("root path {} is not a directory", root.display()),
            });
        }
        Ok(Self { root: canonical })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make a path absolute and resolve it as far as the filesystem allows
    ///
    /// The deepest existing ancestor is canonicalized (following symlinks)
    /// and the missing remainder is appended and normalized lexically, so
    /// the result names the directory `create_dir_all` would really create.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let absolute = std::path::absolute(path)?;
        let components: Vec<Component<'_>> = absolute.components().collect();

        for split in (1..=components.len()).rev() {
            let existing: PathBuf = components[..split].iter().collect();
            match std::fs::canonicalize(&existing) {
                Ok(mut resolved) => {
                    resolved.extend(&components[split..]);
                    return Ok(normalize_lexically(&resolved));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(normalize_lexically(&absolute))
    }

    /// Object key for a local path
    pub fn key_for(&self, path: &Path) -> Result<String> {
        derive_key(&self.root, &self.resolve(path)?)
    }
}
