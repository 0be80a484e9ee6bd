//! Error types for the colabdb SDK.

use colab_db::DbError;
use thiserror::Error;

/// Error type for SDK operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
