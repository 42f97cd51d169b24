//! Wiring a run's directories, bucket and trigger from a [`SyncConfig`]

use std::sync::Arc;

use storage::StorageBackend;
use sync_core::{Result, SyncConfig};
use tracing::info;

use crate::callback::SyncCallback;
use crate::engine::{SyncEngine, SyncEngineConfig};
use crate::trigger::TriggerPolicy;

/// Build a ready-to-use callback for a training run
///
/// Creates `<root>/<project>/<run_id>/checkpoints` and, when resuming, pulls
/// the prior run's checkpoints into its own directory before returning.
pub async fn setup_checkpoint_sync(
    config: &SyncConfig,
    storage: Arc<dyn StorageBackend>,
) -> Result<SyncCallback> {
    config.validate()?;
    let root = config.resolve_root()?;
    let policy = TriggerPolicy::new(config.every_n_epochs)?;

    let mut engine_config =
        SyncEngineConfig::new(config.save_dir(&root)).with_root_path(&root);
    if let Some(load_dir) = config.load_dir(&root) {
        engine_config = engine_config.with_load_dir(load_dir);
    }

    let engine = SyncEngine::new(storage, engine_config).await?;

    if engine.load_binding().is_some() {
        let report = engine.download().await?;
        info!(
            load_from_run = config.load_from_run.as_deref().unwrap_or_default(),
            files = report.transferred,
            "Restored checkpoints from prior run"
        );
    }

    Ok(SyncCallback::new(engine, policy))
}

/// Connect to the configured bucket, then [`setup_checkpoint_sync`]
pub async fn connect(config: &SyncConfig) -> Result<SyncCallback> {
    config.validate()?;
    let storage = storage::from_config(&config.storage).await?;
    setup_checkpoint_sync(config, storage).await
}
