//! Training loop hooks that upload on a trigger policy

use parking_lot::Mutex;
use sync_core::{Epoch, Result, SyncReport};
use tracing::debug;

use crate::engine::SyncEngine;
use crate::trigger::TriggerPolicy;

/// Couples a [`SyncEngine`] with a [`TriggerPolicy`]
///
/// Hosts call [`on_train_epoch_end`](Self::on_train_epoch_end) after every
/// epoch and [`on_train_end`](Self::on_train_end) once training finishes.
#[derive(Debug)]
pub struct SyncCallback {
    engine: SyncEngine,
    policy: Mutex<TriggerPolicy>,
}

impl SyncCallback {
    pub fn new(engine: SyncEngine, policy: TriggerPolicy) -> Self {
        Self {
            engine,
            policy: Mutex::new(policy),
        }
    }

    /// Underlying engine, for explicit uploads and downloads
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Epoch last seen by the trigger policy
    pub fn last_known_epoch(&self) -> Epoch {
        self.policy.lock().last_known_epoch()
    }

    /// Upload if the policy fires for this epoch
    ///
    /// Returns `None` when the epoch is not a sync boundary.
    pub async fn on_train_epoch_end(&self, epoch: Option<Epoch>) -> Result<Option<SyncReport>> {
        let fire = self.policy.lock().on_epoch_end(epoch);
        if !fire {
            return Ok(None);
        }

        debug!(epoch = self.last_known_epoch(), "Epoch boundary reached, uploading");
        self.engine.upload().await.map(Some)
    }

    /// Final upload when training completes
    ///
    /// Returns `None` if the policy declines the final sync.
    pub async fn on_train_end(&self) -> Result<Option<SyncReport>> {
        let fire = self.policy.lock().on_training_end();
        if !fire {
            return Ok(None);
        }

        debug!(epoch = self.last_known_epoch(), "Training finished, uploading");
        self.engine.upload().await.map(Some)
    }
}
