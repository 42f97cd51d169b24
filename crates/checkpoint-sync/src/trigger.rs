//! Epoch-interval sync trigger

use sync_core::{Epoch, Error, Result};
use tracing::debug;

/// Decides which lifecycle events should sync
///
/// Hosts pass the authoritative epoch when they have one. Otherwise the
/// policy counts epochs itself, starting from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPolicy {
    interval_epochs: u64,
    last_known_epoch: Epoch,
}

impl TriggerPolicy {
    /// Sync every `interval_epochs` epochs; must be at least 1
    pub fn new(interval_epochs: u64) -> Result<Self> {
        if interval_epochs == 0 {
            return Err(Error::InvalidConfig {
                message: "sync interval must be at least 1 epoch".to_string(),
            });
        }
        Ok(Self {
            interval_epochs,
            last_known_epoch: 0,
        })
    }

    /// Sync at the end of every epoch
    pub fn every_epoch() -> Self {
        Self {
            interval_epochs: 1,
            last_known_epoch: 0,
        }
    }

    /// Configured interval
    pub fn interval_epochs(&self) -> u64 {
        self.interval_epochs
    }

    /// Epoch seen on the most recent `on_epoch_end`
    pub fn last_known_epoch(&self) -> Epoch {
        self.last_known_epoch
    }

    /// Record an epoch end and report whether a sync is due
    pub fn on_epoch_end(&mut self, epoch: Option<Epoch>) -> bool {
        self.last_known_epoch = match epoch {
            Some(epoch) => epoch,
            None => self.last_known_epoch.saturating_add(1),
        };
        let due = self.last_known_epoch % self.interval_epochs == 0;
        debug!(
            epoch = self.last_known_epoch,
            interval = self.interval_epochs,
            due,
            "Epoch ended"
        );
        due
    }

    /// Training finished; the final sync is unconditional
    pub fn on_training_end(&self) -> bool {
        true
    }
}
