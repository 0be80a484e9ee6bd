//! Error types for the model database layer.

use colab_backend::BackendError;
use thiserror::Error;

/// Errors that can occur in model database operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Use of disposed {0}")]
    Disposed(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::SerializationError(err.to_string())
    }
}

impl From<BackendError> for DbError {
    fn from(err: BackendError) -> Self {
        DbError::ConnectionFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
