//! Client-side error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the upload client.
///
/// Transport trouble and 5xx responses are transient and worth retrying;
/// the named variants below them are contract violations the server will
/// answer the same way every time, so they surface immediately.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// Transport failure: refused connections, resets, broken streams.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{message}")]
    IncompleteUpload {
        message: String,
        missing_indices: Vec<u32>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other non-success response, keyed by status and error code.
    #[error("API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// One chunk gave up, terminating the whole transfer attempt.
    #[error("chunk {index} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        index: u32,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] gantry_core::Error),

    #[error("artifact read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        let err = ClientError::Api {
            status: 502,
            code: "reassembly_failed".to_string(),
            message: "chunk read failed".to_string(),
        };
        assert!(err.is_retryable());
        assert!(ClientError::Timeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn test_contract_violations_are_not_retryable() {
        assert!(!ClientError::SessionNotFound("gone".to_string()).is_retryable());
        assert!(!ClientError::PayloadTooLarge("too big".to_string()).is_retryable());
        assert!(!ClientError::InvalidRequest("bad index".to_string()).is_retryable());
        assert!(
            !ClientError::IncompleteUpload {
                message: "missing 2 of 4 chunks".to_string(),
                missing_indices: vec![1, 3],
            }
            .is_retryable()
        );
        let conflict = ClientError::Api {
            status: 409,
            code: "conflict".to_string(),
            message: "finalize already in flight".to_string(),
        };
        assert!(!conflict.is_retryable());
    }

    #[test]
    fn test_chunk_failure_is_terminal() {
        let err = ClientError::ChunkFailed {
            index: 7,
            attempts: 3,
            source: Box::new(ClientError::Timeout(Duration::from_secs(30))),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("chunk 7"));
    }
}
