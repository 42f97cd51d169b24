//! Upload and download flows against in-memory and directory buckets

mod common;

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use checkpoint_sync::{SyncEngine, SyncEngineConfig};
use common::{canonical, init_tracing, write_file, FaultyStorage};
use storage::{LocalStorage, MemoryStorage, StorageBackend};
use sync_core::Error;
use tempfile::TempDir;

#[tokio::test]
async fn test_scenario_keys_mirror_local_layout() -> Result<()> {
    init_tracing();
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    write_file(&save_dir.join("last.ckpt"), b"last");
    write_file(&save_dir.join("epoch5.ckpt"), b"epoch5");

    let bucket = MemoryStorage::new();
    let engine = SyncEngine::new(
        Arc::new(bucket.clone()),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;

    assert_eq!(engine.save_binding().remote_key(), "proj/run1/checkpoints");
    engine.upload().await?;

    assert_eq!(
        bucket.keys(),
        vec![
            "proj/run1/checkpoints/epoch5.ckpt",
            "proj/run1/checkpoints/last.ckpt",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_relative_paths_resolve_against_root() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let dotted = root.join("proj/./run1/../run1/checkpoints");

    let engine = SyncEngine::new(
        Arc::new(MemoryStorage::new()),
        SyncEngineConfig::new(&dotted).with_root_path(&root),
    )
    .await?;

    assert_eq!(engine.save_binding().remote_key(), "proj/run1/checkpoints");
    assert_eq!(
        engine.save_binding().local_dir(),
        root.join("proj/run1/checkpoints")
    );
    Ok(())
}

#[tokio::test]
async fn test_upload_replaces_remote_with_local_state() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    let bucket_dir = TempDir::new()?;
    let bucket = LocalStorage::new(bucket_dir.path());

    write_file(&save_dir.join("epoch1.ckpt"), b"1");
    write_file(&save_dir.join("epoch2.ckpt"), b"2");
    let engine = SyncEngine::new(
        Arc::new(bucket.clone()),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;
    engine.upload().await?;

    // The trainer prunes old checkpoints; the next upload mirrors that
    std::fs::remove_file(save_dir.join("epoch1.ckpt"))?;
    write_file(&save_dir.join("epoch3.ckpt"), b"3");
    let report = engine.upload().await?;

    let keys: Vec<String> = bucket
        .list("proj/run1/checkpoints/")
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(
        keys,
        vec![
            "proj/run1/checkpoints/epoch2.ckpt",
            "proj/run1/checkpoints/epoch3.ckpt",
        ]
    );
    assert_eq!(report.deleted, 2);
    assert_eq!(report.transferred, 2);
    assert!(!bucket_dir.path().join("proj/run1/checkpoints/epoch1.ckpt").exists());
    Ok(())
}

#[tokio::test]
async fn test_directory_bucket_mirrors_dot_tmp_names() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    write_file(&save_dir.join(".scratch.tmp"), b"partial");
    write_file(&save_dir.join("last.ckpt"), b"weights");

    let bucket_dir = TempDir::new()?;
    let bucket = LocalStorage::new(bucket_dir.path());
    let engine = SyncEngine::new(
        Arc::new(bucket.clone()),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;

    engine.upload().await?;
    let keys: Vec<String> = bucket
        .list("proj/run1/checkpoints/")
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(
        keys,
        vec![
            "proj/run1/checkpoints/.scratch.tmp",
            "proj/run1/checkpoints/last.ckpt",
        ]
    );

    // Once listed, a removed .tmp file is cleared like any other object
    std::fs::remove_file(save_dir.join(".scratch.tmp"))?;
    let report = engine.upload().await?;
    assert_eq!(report.deleted, 2);
    assert_eq!(bucket.list("proj/run1/checkpoints/").await?.len(), 1);
    assert!(!bucket_dir
        .path()
        .join("proj/run1/checkpoints/.scratch.tmp")
        .exists());
    Ok(())
}

#[tokio::test]
async fn test_upload_twice_is_idempotent() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    write_file(&save_dir.join("last.ckpt"), b"weights");
    write_file(&save_dir.join("nested/opt.ckpt"), b"optimizer");

    let bucket = MemoryStorage::new();
    let engine = SyncEngine::new(
        Arc::new(bucket.clone()),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;

    engine.upload().await?;
    let first = bucket.snapshot();
    engine.upload().await?;
    assert_eq!(bucket.snapshot(), first);
    Ok(())
}

#[tokio::test]
async fn test_failed_upload_heals_on_next_run() -> Result<()> {
    init_tracing();
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    for name in ["a.ckpt", "b.ckpt", "c.ckpt"] {
        write_file(&save_dir.join(name), name.as_bytes());
    }

    let storage = Arc::new(FaultyStorage::new());
    storage
        .inner
        .put("proj/run1/checkpoints/stale.ckpt", Bytes::from("old"))
        .await?;
    let engine = SyncEngine::new(
        storage.clone(),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;

    storage.fail_put_at(2);
    let err = engine.upload().await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(storage.inner.keys(), vec!["proj/run1/checkpoints/a.ckpt"]);

    storage.heal();
    engine.upload().await?;
    assert_eq!(
        storage.inner.keys(),
        vec![
            "proj/run1/checkpoints/a.ckpt",
            "proj/run1/checkpoints/b.ckpt",
            "proj/run1/checkpoints/c.ckpt",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_first_put_leaves_empty_prefix_then_heals() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    for name in ["a.ckpt", "b.ckpt"] {
        write_file(&save_dir.join(name), name.as_bytes());
    }

    let storage = Arc::new(FaultyStorage::new());
    storage
        .inner
        .put("proj/run1/checkpoints/stale.ckpt", Bytes::from("old"))
        .await?;
    let engine = SyncEngine::new(
        storage.clone(),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;

    // The clear ran, then the very first upload failed
    storage.fail_put_at(1);
    let err = engine.upload().await.unwrap_err();
    assert!(err.is_transport());
    assert!(storage.list("proj/run1/checkpoints/").await?.is_empty());

    storage.heal();
    let report = engine.upload().await?;
    assert_eq!(report.deleted, 0);
    assert_eq!(
        storage.inner.keys(),
        vec![
            "proj/run1/checkpoints/a.ckpt",
            "proj/run1/checkpoints/b.ckpt",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_upload_leaves_neighbouring_prefixes_alone() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let save_dir = root.join("proj/run1/checkpoints");
    write_file(&save_dir.join("last.ckpt"), b"new");

    let bucket = MemoryStorage::new();
    for key in [
        "proj/run1/checkpoints-archive/last.ckpt",
        "proj/run10/checkpoints/last.ckpt",
        "proj/run1/checkpoints/stale.ckpt",
    ] {
        bucket.put(key, Bytes::from("x")).await?;
    }

    let engine = SyncEngine::new(
        Arc::new(bucket.clone()),
        SyncEngineConfig::new(&save_dir).with_root_path(&root),
    )
    .await?;
    engine.upload().await?;

    assert_eq!(
        bucket.keys(),
        vec![
            "proj/run1/checkpoints-archive/last.ckpt",
            "proj/run1/checkpoints/last.ckpt",
            "proj/run10/checkpoints/last.ckpt",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_download_flattens_into_load_dir() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let bucket_dir = TempDir::new()?;
    let bucket = LocalStorage::new(bucket_dir.path());
    bucket
        .put("proj/run0/checkpoints/last.ckpt", Bytes::from("last"))
        .await?;
    bucket
        .put("proj/run0/checkpoints/sub/deep/epoch9.ckpt", Bytes::from("nine"))
        .await?;

    let engine = SyncEngine::new(
        Arc::new(bucket),
        SyncEngineConfig::new(root.join("proj/run1/checkpoints"))
            .with_root_path(&root)
            .with_load_dir(root.join("proj/run0/checkpoints")),
    )
    .await?;
    let report = engine.download().await?;

    let load_dir = root.join("proj/run0/checkpoints");
    assert_eq!(report.transferred, 2);
    assert_eq!(std::fs::read(load_dir.join("last.ckpt"))?, b"last");
    assert_eq!(std::fs::read(load_dir.join("epoch9.ckpt"))?, b"nine");
    assert!(!load_dir.join("sub").exists());
    Ok(())
}

#[tokio::test]
async fn test_named_operations_reject_paths_before_io() -> Result<()> {
    let work = TempDir::new()?;
    let root = canonical(work.path());
    let storage = Arc::new(FaultyStorage::new());
    let engine = SyncEngine::new(
        storage.clone(),
        SyncEngineConfig::new(root.join("proj/run1/checkpoints"))
            .with_root_path(&root)
            .with_load_dir(root.join("proj/run0/checkpoints")),
    )
    .await?;

    for name in ["sub/last.ckpt", "../run0/last.ckpt", "..", "."] {
        assert!(matches!(
            engine.upload_named(name).await,
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            engine.download_named(name).await,
            Err(Error::InvalidArgument { .. })
        ));
    }
    assert_eq!(storage.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_engine_outside_root_is_rejected() -> Result<()> {
    let work = TempDir::new()?;
    let elsewhere = TempDir::new()?;
    let result = SyncEngine::new(
        Arc::new(MemoryStorage::new()),
        SyncEngineConfig::new(elsewhere.path().join("checkpoints")).with_root_path(work.path()),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::PathNotUnderRoot { .. }));
    assert!(err.is_fatal());
    Ok(())
}
