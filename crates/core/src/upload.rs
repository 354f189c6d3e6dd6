//! Upload session types, destination paths, and wire contracts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID, e.g. one read back from a session store.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid upload ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted state of an upload session.
///
/// Terminal outcomes are not states: a successful finalize and an abort both
/// tear the session down, so a session row only ever exists as `Open`
/// (accepting chunks) or `Finalizing` (reassembly claimed, chunks frozen).
/// A failed reassembly transitions `Finalizing` back to `Open`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session is accepting chunks.
    Open,
    /// Finalize has claimed the session; reassembly is in flight.
    Finalizing,
}

impl SessionState {
    /// Check if the session can still receive chunks.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Stable string form used by session stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finalizing => "finalizing",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "finalizing" => Ok(Self::Finalizing),
            other => Err(crate::Error::UploadSession(format!(
                "invalid session state: {other}"
            ))),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An upload session tracking one in-flight artifact transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub upload_id: UploadId,
    /// Logical bucket the artifact lands in.
    pub bucket: String,
    /// Final object key, fixed at session creation.
    pub destination_path: String,
    /// Declared content type of the artifact.
    pub content_type: String,
    /// Number of chunks the client committed to sending.
    pub total_chunks: u32,
    /// Current session state.
    pub state: SessionState,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session last saw activity.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new open session, validating the caller-supplied fields.
    pub fn new(bucket: &str, content_type: &str, total_chunks: u32) -> crate::Result<Self> {
        validate_bucket(bucket)?;
        validate_content_type(content_type)?;
        if total_chunks < 1 {
            return Err(crate::Error::UploadSession(
                "total_chunks must be at least 1".to_string(),
            ));
        }

        let upload_id = UploadId::new();
        let now = OffsetDateTime::now_utc();
        Ok(Self {
            upload_id,
            bucket: bucket.to_string(),
            destination_path: destination_path(bucket, &upload_id, content_type),
            content_type: content_type.to_string(),
            total_chunks,
            state: SessionState::Open,
            created_at: now,
            updated_at: now,
        })
    }

    /// Object key holding the transient payload for one chunk.
    pub fn chunk_object_key(&self, index: u32) -> String {
        chunk_object_key(&self.destination_path, index)
    }
}

/// Object key holding the transient payload for chunk `index`.
pub fn chunk_object_key(destination_path: &str, index: u32) -> String {
    format!("{destination_path}.chunk.{index}")
}

/// Destination key for a session: `{bucket}/{upload_id}.{ext}`.
pub fn destination_path(bucket: &str, upload_id: &UploadId, content_type: &str) -> String {
    format!(
        "{bucket}/{upload_id}.{ext}",
        ext = extension_for(content_type)
    )
}

/// File extension for a declared content type, `bin` when unrecognized.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        _ => "bin",
    }
}

/// Validate a bucket name as a safe single key segment.
///
/// Lowercase alphanumerics, `-` and `_`, at most 63 bytes, starting with an
/// alphanumeric. Rules out path separators and dot segments entirely.
pub fn validate_bucket(bucket: &str) -> crate::Result<()> {
    let valid = !bucket.is_empty()
        && bucket.len() <= 63
        && bucket.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(crate::Error::InvalidBucket(bucket.to_string()))
    }
}

/// Validate a `type/subtype` content type.
pub fn validate_content_type(content_type: &str) -> crate::Result<()> {
    let valid = content_type.len() <= 255
        && content_type.split_once('/').is_some_and(|(kind, subtype)| {
            let token_ok = |s: &str| {
                !s.is_empty()
                    && s.chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
            };
            token_ok(kind) && token_ok(subtype)
        });
    if valid {
        Ok(())
    } else {
        Err(crate::Error::InvalidContentType(content_type.to_string()))
    }
}

/// Chunk indices in `[0, total_chunks)` absent from `received`, ascending.
pub fn missing_indices(total_chunks: u32, received: &[u32]) -> Vec<u32> {
    let received: HashSet<u32> = received.iter().copied().collect();
    (0..total_chunks)
        .filter(|index| !received.contains(index))
        .collect()
}

/// Terminal result of a completed upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadResult {
    /// Publicly addressable URL of the reassembled artifact.
    pub public_url: String,
    /// Object key the artifact was stored under.
    pub stored_path: String,
    /// Total size of the reassembled artifact in bytes.
    pub size_bytes: u64,
}

/// Request to create an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Declared content type of the artifact.
    pub content_type: String,
    /// Number of chunks the client will send.
    pub total_chunks: u32,
    /// Logical bucket the artifact lands in.
    pub bucket: String,
}

/// Response from creating an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    /// The upload session ID.
    pub upload_id: String,
    /// Final object key the artifact will be stored under.
    pub destination_path: String,
}

/// Acknowledgement for one received chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkReceipt {
    /// Distinct chunk indices received so far.
    pub chunks_received: u32,
    /// Number of chunks the session expects.
    pub total_chunks: u32,
}

/// Read-only view of a session, used for resume and inspection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub state: SessionState,
    pub chunks_received: u32,
    pub total_chunks: u32,
    /// Indices not yet received, in ascending order.
    pub missing_indices: Vec<u32>,
}

/// Server limits advertised to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    pub api_version: String,
    pub max_artifact_bytes: u64,
    pub max_chunk_payload_bytes: u64,
}
