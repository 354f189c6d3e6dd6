//! Session store error types.

use thiserror::Error;

/// Session store operation errors.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SessionStoreError {
    fn from(e: std::io::Error) -> Self {
        SessionStoreError::Config(e.to_string())
    }
}

/// Result type for session store operations.
pub type SessionStoreResult<T> = std::result::Result<T, SessionStoreError>;
