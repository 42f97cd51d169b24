//! Rotated "last" checkpoint canonicalization
//!
//! The checkpoint writer renames `last.ckpt` to `last-v1.ckpt` when it
//! collides with an existing file. Folding it back keeps the resume key stable.
//! Only the `-v1` suffix is handled.

use std::path::Path;

use sync_core::Result;
use tokio::fs;
use tracing::info;

/// Canonical name of the most recent checkpoint
pub const LAST_CHECKPOINT: &str = "last.ckpt";

/// Name the checkpoint writer uses on collision
pub const ROTATED_LAST_CHECKPOINT: &str = "last-v1.ckpt";

/// Move `last-v1.ckpt` over `last.ckpt` if present
///
/// Returns whether a rename happened.
pub async fn apply_rotation_rewrite(dir: &Path) -> Result<bool> {
    let rotated = dir.join(ROTATED_LAST_CHECKPOINT);
    let is_file = match fs::metadata(&rotated).await {
        Ok(metadata) => metadata.is_file(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };
    if !is_file {
        return Ok(false);
    }

    let canonical = dir.join(LAST_CHECKPOINT);
    fs::rename(&rotated, &canonical).await?;
    info!(
        from = %rotated.display(),
        to = %canonical.display(),
        "Folded rotated checkpoint into last.ckpt"
    );
    Ok(true)
}
