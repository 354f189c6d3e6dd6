//! Database models mapping to the session schema.

use crate::error::{SessionStoreError, SessionStoreResult};
use gantry_core::upload::{SessionState, UploadSession};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub upload_id: Uuid,
    pub bucket: String,
    pub destination_path: String,
    pub content_type: String,
    pub total_chunks: i64,
    pub state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UploadSessionRow {
    /// Build a row from the domain session.
    pub fn from_session(session: &UploadSession) -> Self {
        Self {
            upload_id: *session.upload_id.as_uuid(),
            bucket: session.bucket.clone(),
            destination_path: session.destination_path.clone(),
            content_type: session.content_type.clone(),
            total_chunks: i64::from(session.total_chunks),
            state: session.state.as_str().to_string(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }

    /// Convert the row back into the domain session.
    ///
    /// Fails if the stored state string or chunk count is out of range, which
    /// indicates a corrupt row rather than a caller mistake.
    pub fn to_session(&self) -> SessionStoreResult<UploadSession> {
        let state = SessionState::parse(&self.state).map_err(|_| {
            SessionStoreError::Internal(format!(
                "session {} has unknown state '{}'",
                self.upload_id, self.state
            ))
        })?;
        let total_chunks = u32::try_from(self.total_chunks).map_err(|_| {
            SessionStoreError::Internal(format!(
                "session {} has out-of-range total_chunks {}",
                self.upload_id, self.total_chunks
            ))
        })?;

        Ok(UploadSession {
            upload_id: gantry_core::UploadId::from_uuid(self.upload_id),
            bucket: self.bucket.clone(),
            destination_path: self.destination_path.clone(),
            content_type: self.content_type.clone(),
            total_chunks,
            state,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Whether the row is in the given state.
    pub fn is_state(&self, state: SessionState) -> bool {
        self.state == state.as_str()
    }
}

/// Received chunk record for an upload session.
#[derive(Debug, Clone, FromRow)]
pub struct SessionChunkRow {
    pub upload_id: Uuid,
    pub chunk_index: i64,
    pub size_bytes: i64,
    pub received_at: OffsetDateTime,
}
