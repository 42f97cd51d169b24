//! Error types for checkpoint synchronization

use thiserror::Error;

/// Result type alias using the sync Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for checkpoint synchronization
#[derive(Error, Debug)]
pub enum Error {
    // Binding errors
    #[error("Path {path} is not under root {root}")]
    PathNotUnderRoot { path: String, root: String },

    #[error("No load binding configured")]
    NoLoadBinding,

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Sync already in progress")]
    SyncInProgress,

    #[error("Checkpoint not found: {path}")]
    CheckpointNotFound { path: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage backend not available: {backend}")]
    StorageUnavailable { backend: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error came from the object store or the local filesystem
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. }
                | Error::StorageUnavailable { .. }
                | Error::StoragePathNotFound { .. }
                | Error::Io(_)
        )
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. } | Error::StorageUnavailable { .. } | Error::SyncInProgress
        )
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::PathNotUnderRoot { .. } | Error::InvalidConfig { .. } | Error::Internal { .. }
        )
    }

    /// Returns a retry delay hint in milliseconds, if applicable
    pub fn retry_delay_hint_ms(&self) -> Option<u64> {
        match self {
            Error::Storage { .. } => Some(100),
            Error::StorageUnavailable { .. } => Some(5000),
            Error::SyncInProgress => Some(1000),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
