//! Error types for the backend layer.

use thiserror::Error;

/// Errors reported by a realtime backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to load document {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Realtime service unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
