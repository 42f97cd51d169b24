//! End-to-end training simulation
//!
//! Run 1 trains with periodic uploads and a final upload; run 2 resumes
//! from run 1's `last.ckpt` and publishes under its own key.

mod common;

use std::sync::Arc;

use anyhow::Result;
use checkpoint_sync::{setup_checkpoint_sync, SyncCallback};
use common::{canonical, init_tracing, write_file};
use storage::{LocalStorage, StorageBackend};
use sync_core::{Error, SyncConfig, DEFAULT_RESUME_FILENAME};
use tempfile::TempDir;

/// Write this epoch's checkpoint the way a Lightning-style writer does
fn write_epoch_checkpoint(callback: &SyncCallback, epoch: u64) {
    let dir = callback.engine().save_binding().local_dir();
    write_file(&dir.join(format!("epoch{}.ckpt", epoch)), format!("epoch {}", epoch).as_bytes());
    if dir.join("last.ckpt").exists() {
        write_file(&dir.join("last-v1.ckpt"), format!("last {}", epoch).as_bytes());
    } else {
        write_file(&dir.join("last.ckpt"), format!("last {}", epoch).as_bytes());
    }
}

#[tokio::test]
async fn test_train_then_resume() -> Result<()> {
    init_tracing();
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let bucket_dir = TempDir::new()?;
    let bucket: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(bucket_dir.path()));

    // Run 1: fresh start, sync every 5 epochs
    let run1 = SyncConfig::new("proj")
        .with_run_id("run1")
        .with_every_n_epochs(5)
        .with_root_path(&root);
    let callback = setup_checkpoint_sync(&run1, bucket.clone()).await?;
    assert!(callback.engine().load_binding().is_none());

    let mut synced = Vec::new();
    for epoch in 1..=7 {
        write_epoch_checkpoint(&callback, epoch);
        if let Some(report) = callback.on_train_epoch_end(Some(epoch)).await? {
            synced.push((epoch, report.rotated));
        }
    }
    assert_eq!(synced, vec![(5, true)]);

    let report = callback
        .on_train_end()
        .await?
        .ok_or_else(|| anyhow::anyhow!("final sync skipped"))?;
    assert!(report.rotated);
    assert_eq!(report.deleted, 6);

    let run1_keys: Vec<String> = bucket
        .list("proj/run1/checkpoints/")
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(run1_keys.len(), 8);
    assert!(!run1_keys.iter().any(|k| k.ends_with("last-v1.ckpt")));
    assert_eq!(
        &bucket.get("proj/run1/checkpoints/last.ckpt").await?[..],
        b"last 7"
    );

    // Run 2: resume from run 1 after the local tree is gone
    std::fs::remove_dir_all(root.join("proj"))?;
    let run2 = SyncConfig::new("proj")
        .with_run_id("run2")
        .with_load_from_run("run1")
        .with_every_n_epochs(5)
        .with_root_path(&root);
    let callback = setup_checkpoint_sync(&run2, bucket.clone()).await?;

    let resume = callback
        .engine()
        .resume_checkpoint_path(DEFAULT_RESUME_FILENAME)?;
    assert_eq!(resume, root.join("proj/run1/checkpoints/last.ckpt"));
    assert_eq!(std::fs::read_to_string(&resume)?, "last 7");

    write_epoch_checkpoint(&callback, 8);
    callback.on_train_end().await?;

    let run2_keys: Vec<String> = bucket
        .list("proj/run2/checkpoints/")
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(
        run2_keys,
        vec![
            "proj/run2/checkpoints/epoch8.ckpt",
            "proj/run2/checkpoints/last.ckpt",
        ]
    );
    // Run 1 is untouched by run 2's uploads
    assert_eq!(bucket.list("proj/run1/checkpoints/").await?.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_resume_from_missing_run_has_nothing_to_load() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let bucket_dir = TempDir::new()?;
    let bucket: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(bucket_dir.path()));

    let config = SyncConfig::new("proj")
        .with_run_id("run2")
        .with_load_from_run("never-ran")
        .with_root_path(&root);
    let callback = setup_checkpoint_sync(&config, bucket).await?;

    assert!(matches!(
        callback
            .engine()
            .resume_checkpoint_path(DEFAULT_RESUME_FILENAME),
        Err(Error::CheckpointNotFound { .. })
    ));
    assert!(matches!(
        callback.engine().download_named("last.ckpt").await,
        Err(Error::StoragePathNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_epoch_counter_without_host_epochs() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let bucket_dir = TempDir::new()?;
    let config = SyncConfig::new("proj")
        .with_every_n_epochs(3)
        .with_root_path(&root);
    let callback =
        setup_checkpoint_sync(&config, Arc::new(LocalStorage::new(bucket_dir.path()))).await?;

    let mut fired = Vec::new();
    for i in 1..=6 {
        if callback.on_train_epoch_end(None).await?.is_some() {
            fired.push(i);
        }
    }
    assert_eq!(fired, vec![3, 6]);
    assert_eq!(callback.last_known_epoch(), 6);
    Ok(())
}
