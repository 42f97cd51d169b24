//! Core type definitions for checkpoint synchronization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Training epoch counter supplied by the host
pub type Epoch = u64;

/// File a resumed run loads by default
pub const DEFAULT_RESUME_FILENAME: &str = "last.ckpt";

/// Engine state; `Syncing` while an upload or download holds the gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    /// No transfer in flight
    Idle,

    /// An upload or download is running
    Syncing,
}

/// Direction of a sync run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncDirection {
    /// Local save directory to remote prefix
    Upload,

    /// Remote prefix to local load directory
    Download,
}

/// Summary of a completed sync run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncReport {
    /// Direction of the run
    pub direction: SyncDirection,

    /// Remote key of the binding that was synced
    pub remote_key: String,

    /// Remote objects deleted before re-publishing
    pub deleted: usize,

    /// Objects uploaded or downloaded
    pub transferred: usize,

    /// Total payload bytes moved
    pub bytes: u64,

    /// Whether `last-v1.ckpt` was folded into `last.ckpt`
    pub rotated: bool,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// Start an empty report for a binding
    pub fn new(direction: SyncDirection, remote_key: impl Into<String>) -> Self {
        Self {
            direction,
            remote_key: remote_key.into(),
            deleted: 0,
            transferred: 0,
            bytes: 0,
            rotated: false,
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    /// Record one transferred object
    pub fn record_transfer(&mut self, size: u64) {
        self.transferred += 1;
        self.bytes += size;
    }

    /// Transfer throughput in MB/s, zero when nothing was timed
    pub fn throughput_mbps(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        (self.bytes as f64 / 1024.0 / 1024.0) / (self.elapsed_ms as f64 / 1000.0)
    }
}
