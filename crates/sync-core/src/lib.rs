//! Sync Core - Foundation for checkpoint directory synchronization
//!
//! Provides the shared error type, configuration and report types used by
//! the storage backends, the sync engine and the host integrations.

pub mod config;
pub mod error;
pub mod types;

pub use config::{StorageConfig, SyncConfig};
pub use error::{Error, Result};
pub use types::*;
