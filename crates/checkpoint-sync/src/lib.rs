//! Checkpoint Sync - Mirror training checkpoint directories to an object store
//!
//! A run writes checkpoints into `<root>/<project>/<run_id>/checkpoints`.
//! The directory's path relative to `<root>` becomes its remote key, so the
//! local layout and the bucket layout line up one to one.
//!
//! - [`KeyMapper`] turns local paths into `/`-separated keys
//! - [`SyncEngine`] uploads with replace semantics and downloads flat
//! - [`TriggerPolicy`] decides which epochs sync
//! - [`SyncCallback`] and [`setup_checkpoint_sync`] wire them into a training loop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use checkpoint_sync::setup_checkpoint_sync;
//! use storage::LocalStorage;
//! use sync_core::SyncConfig;
//!
//! # async fn example() -> sync_core::Result<()> {
//! let config = SyncConfig::new("proj")
//!     .with_run_id("run2")
//!     .with_load_from_run("run1")
//!     .with_every_n_epochs(5);
//! let callback = setup_checkpoint_sync(&config, Arc::new(LocalStorage::new("/mnt/bucket"))).await?;
//!
//! for epoch in 1..=20 {
//!     // ... train, write checkpoints ...
//!     callback.on_train_epoch_end(Some(epoch)).await?;
//! }
//! callback.on_train_end().await?;
//! # Ok(())
//! # }
//! ```

pub mod binding;
pub mod callback;
pub mod engine;
pub mod keymap;
pub mod rotation;
pub mod setup;
pub mod trigger;

pub use binding::{validate_filename, SyncBinding};
pub use callback::SyncCallback;
pub use engine::{SyncEngine, SyncEngineConfig};
pub use keymap::{derive_key, KeyMapper};
pub use rotation::{apply_rotation_rewrite, LAST_CHECKPOINT, ROTATED_LAST_CHECKPOINT};
pub use setup::{connect, setup_checkpoint_sync};
pub use trigger::TriggerPolicy;
