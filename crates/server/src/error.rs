//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Format missing chunk indices for display, capping at MAX_DISPLAYED to
/// prevent log/response bloat.
fn format_missing_indices(indices: &[u32]) -> String {
    const MAX_DISPLAYED: usize = 5;
    if indices.len() <= MAX_DISPLAYED {
        format!("{:?}", indices)
    } else {
        let sample: Vec<_> = indices.iter().take(MAX_DISPLAYED).collect();
        format!("{:?} (and {} more)", sample, indices.len() - MAX_DISPLAYED)
    }
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Chunk indices not yet received. Only set on incomplete-upload errors,
    /// so clients can resend exactly the missing chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_indices: Option<Vec<u32>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("incomplete upload: missing {} of {total} chunks: {}", .missing_indices.len(), format_missing_indices(.missing_indices))]
    IncompleteUpload {
        missing_indices: Vec<u32>,
        total: u32,
    },

    #[error("reassembly failed: {0}")]
    ReassemblyFailed(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] gantry_storage::StorageError),

    #[error("session store error: {0}")]
    SessionStore(#[from] gantry_sessions::SessionStoreError),

    #[error("{0}")]
    Core(#[from] gantry_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Conflict(_) => "conflict",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::ReassemblyFailed(_) => "reassembly_failed",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                gantry_storage::StorageError::NotFound(_) => "not_found",
                _ => "storage_error",
            },
            Self::SessionStore(e) => match e {
                gantry_sessions::SessionStoreError::NotFound(_) => "not_found",
                gantry_sessions::SessionStoreError::Conflict(_) => "conflict",
                _ => "session_store_error",
            },
            Self::Core(e) => match e {
                gantry_core::Error::SizeExceeded { .. } => "payload_too_large",
                _ => "invalid_request",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::IncompleteUpload { .. } => StatusCode::CONFLICT,
            // The artifact store, not this service, failed.
            Self::ReassemblyFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                gantry_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::SessionStore(e) => match e {
                gantry_sessions::SessionStoreError::NotFound(_) => StatusCode::NOT_FOUND,
                gantry_sessions::SessionStoreError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(e) => match e {
                gantry_core::Error::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let missing_indices = match &self {
            Self::IncompleteUpload {
                missing_indices, ..
            } => Some(missing_indices.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            missing_indices,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_upload_format_small() {
        let err = ApiError::IncompleteUpload {
            missing_indices: vec![1, 3],
            total: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("missing 2 of 10 chunks"));
        assert!(msg.contains("[1, 3]"));
    }

    #[test]
    fn test_incomplete_upload_format_large() {
        let err = ApiError::IncompleteUpload {
            missing_indices: (0..8).collect(),
            total: 18,
        };
        let msg = err.to_string();
        assert!(msg.contains("missing 8 of 18 chunks"));
        assert!(msg.contains("and 3 more"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::NotFound("upload session".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PayloadTooLarge { size: 2, max: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::IncompleteUpload {
                missing_indices: vec![0],
                total: 1
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::ReassemblyFailed("write failed".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Core(gantry_core::Error::SizeExceeded { size: 99, max: 1 }).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Core(gantry_core::Error::InvalidBucket("UPPER".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_session_store_errors_map_by_kind() {
        let not_found =
            ApiError::SessionStore(gantry_sessions::SessionStoreError::NotFound("x".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.code(), "not_found");

        let conflict =
            ApiError::SessionStore(gantry_sessions::SessionStoreError::Conflict("x".into()));
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "conflict");
    }
}
