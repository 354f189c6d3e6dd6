//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("artifact too large: {size} bytes exceeds the {max} byte limit")]
    SizeExceeded { size: u64, max: u64 },

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("invalid chunk index: {index} (session expects {total} chunks)")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),

    #[error("upload session error: {0}")]
    UploadSession(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
