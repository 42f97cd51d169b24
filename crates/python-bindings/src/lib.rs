//! Python bindings for checkpoint sync
//!
//! Exposes a blocking `CheckpointSync` class that a Python training loop
//! calls from its epoch and train-end hooks.
//!
//! # Example
//!
//! ```python
//! from ckptsync import CheckpointSync
//!
//! sync = CheckpointSync("proj", bucket="ckpts", run_id="run2",
//!                       load_from_run="run1", every_n_epochs=5)
//! trainer.fit(model, ckpt_path=sync.resume_path())
//!
//! for epoch in range(1, 21):
//!     train_one_epoch()
//!     sync.on_train_epoch_end(epoch)
//! sync.on_train_end()
//! ```

use pyo3::prelude::*;

mod sync;

/// Python module for checkpoint sync
#[pymodule]
fn _ckptsync(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<sync::CheckpointSync>()?;
    m.add_class::<sync::SyncReport>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
