//! Upload session handlers.

use crate::cleanup::remove_chunk_objects;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_RECEIVED, CHUNK_RECEIVE_DURATION, CHUNKS_RECEIVED, FINALIZE_DURATION,
    REASSEMBLY_FAILURES, UPLOAD_SESSIONS_ABORTED, UPLOAD_SESSIONS_CREATED,
    UPLOAD_SESSIONS_FINALIZED, record_upload_error,
};
use crate::reassembly::reassemble_session;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use gantry_core::upload::{
    ChunkReceipt, CreateSessionRequest, CreateSessionResponse, SessionStatusResponse,
    UploadResult, UploadSession, missing_indices,
};
use gantry_sessions::models::UploadSessionRow;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum request body size for create session requests (64 KiB).
///
/// Create bodies carry three small fields; anything bigger is malformed.
const MAX_CREATE_BODY_SIZE: usize = 64 * 1024;

/// Additional buffer for chunk payloads beyond the configured maximum.
const CHUNK_PAYLOAD_BUFFER: usize = 1024;

fn parse_upload_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::InvalidRequest(format!("invalid upload ID: {e}")))
}

/// Distinct chunk indices recorded for a session, ascending.
async fn received_indices(state: &AppState, upload_id: Uuid) -> ApiResult<Vec<u32>> {
    let rows = state.sessions.received_chunks(upload_id).await?;
    rows.iter()
        .map(|row| {
            u32::try_from(row.chunk_index).map_err(|_| {
                ApiError::Internal(format!(
                    "session {upload_id} has out-of-range chunk index {}",
                    row.chunk_index
                ))
            })
        })
        .collect()
}

fn content_length(req: &Request) -> Option<u64> {
    req.headers()
        .get(axum::http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// POST /v1/uploads - Create a new upload session.
#[tracing::instrument(skip(state, req))]
pub async fn create_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let body: CreateSessionRequest = {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_CREATE_BODY_SIZE)
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid JSON: {e}")))?
    };

    if body.total_chunks > state.config.server.max_chunks_per_session {
        return Err(ApiError::InvalidRequest(format!(
            "total_chunks {} exceeds the per-session maximum {}",
            body.total_chunks, state.config.server.max_chunks_per_session
        )));
    }

    // Validates the bucket, content type, and chunk count floor
    let session = UploadSession::new(&body.bucket, &body.content_type, body.total_chunks)?;

    let row = UploadSessionRow::from_session(&session);
    state.sessions.create_session(&row).await?;

    UPLOAD_SESSIONS_CREATED.inc();
    tracing::info!(
        upload_id = %session.upload_id,
        bucket = %session.bucket,
        content_type = %session.content_type,
        total_chunks = session.total_chunks,
        "Created upload session"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            upload_id: session.upload_id.to_string(),
            destination_path: session.destination_path,
        }),
    ))
}

/// GET /v1/uploads/{upload_id} - Inspect an in-flight session.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let upload_id = parse_upload_id(&upload_id)?;

    let row = state
        .sessions
        .get_session(upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload session not found".to_string()))?;
    let session = row.to_session()?;

    let received = received_indices(&state, upload_id).await?;
    let missing = missing_indices(session.total_chunks, &received);

    Ok(Json(SessionStatusResponse {
        state: session.state,
        chunks_received: received.len() as u32,
        total_chunks: session.total_chunks,
        missing_indices: missing,
    }))
}

/// PUT /v1/uploads/{upload_id}/chunks/{index} - Receive one chunk payload.
///
/// Idempotent per index: a re-sent chunk overwrites the stored object and
/// leaves the acknowledged count unchanged.
#[tracing::instrument(skip(state, req), fields(upload_id = %upload_id, chunk_index = %chunk_index))]
pub async fn receive_chunk(
    State(state): State<AppState>,
    Path((upload_id, chunk_index)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Json<ChunkReceipt>> {
    let start_time = Instant::now();

    let upload_id = parse_upload_id(&upload_id)?;
    let chunk_index: u32 = chunk_index
        .parse()
        .map_err(|e| ApiError::InvalidRequest(format!("invalid chunk index: {e}")))?;

    let row = state
        .sessions
        .get_session(upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload session not found".to_string()))?;
    let session = row.to_session()?;

    if !session.state.is_open() {
        return Err(ApiError::Conflict(format!(
            "upload session is {}, not open",
            session.state
        )));
    }

    if chunk_index >= session.total_chunks {
        record_upload_error("chunk_index_out_of_range");
        return Err(gantry_core::Error::InvalidChunkIndex {
            index: chunk_index,
            total: session.total_chunks,
        }
        .into());
    }

    let max_payload = state.config.server.max_chunk_payload_bytes;

    // Reject declared-oversize payloads before buffering anything.
    if let Some(declared) = content_length(&req)
        && declared > max_payload
    {
        record_upload_error("chunk_too_large");
        return Err(ApiError::PayloadTooLarge {
            size: declared,
            max: max_payload,
        });
    }

    let body = axum::body::to_bytes(
        req.into_body(),
        max_payload as usize + CHUNK_PAYLOAD_BUFFER,
    )
    .await
    .map_err(|e| ApiError::InvalidRequest(format!("failed to read chunk: {e}")))?;

    // CHUNK_PAYLOAD_BUFFER exists for HTTP framing overhead, not for
    // oversized payloads: the configured ceiling is enforced strictly.
    if body.len() as u64 > max_payload {
        record_upload_error("chunk_too_large");
        return Err(ApiError::PayloadTooLarge {
            size: body.len() as u64,
            max: max_payload,
        });
    }

    // Store the payload, then record the receipt. A failure between the two
    // leaves an orphaned chunk object for the sweep; the reverse order could
    // acknowledge a chunk that was never stored.
    let size_bytes = body.len() as u64;
    let key = session.chunk_object_key(chunk_index);
    state.storage.put(&key, body).await?;

    state
        .sessions
        .mark_chunk_received(upload_id, chunk_index, size_bytes, OffsetDateTime::now_utc())
        .await?;

    let chunks_received = u32::try_from(state.sessions.count_received(upload_id).await?)
        .map_err(|_| ApiError::Internal("received chunk count out of range".to_string()))?;

    CHUNKS_RECEIVED.inc();
    BYTES_RECEIVED.inc_by(size_bytes);
    CHUNK_RECEIVE_DURATION.observe(start_time.elapsed().as_secs_f64());

    tracing::debug!(
        upload_id = %upload_id,
        chunk_index = chunk_index,
        size_bytes = size_bytes,
        chunks_received = chunks_received,
        "Received chunk"
    );

    Ok(Json(ChunkReceipt {
        chunks_received,
        total_chunks: session.total_chunks,
    }))
}

/// POST /v1/uploads/{upload_id}/finalize - Reassemble a completed upload.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn finalize_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadResult>> {
    let start_time = Instant::now();
    let upload_id = parse_upload_id(&upload_id)?;

    let row = state
        .sessions
        .get_session(upload_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("upload session not found".to_string()))?;
    let session = row.to_session()?;

    if !session.state.is_open() {
        return Err(ApiError::Conflict(format!(
            "upload session is {}, not open",
            session.state
        )));
    }

    // Completeness is re-verified before the state transition, so an
    // incomplete session never leaves 'open' and no reassembly I/O happens.
    let received = received_indices(&state, upload_id).await?;
    let missing = missing_indices(session.total_chunks, &received);
    if !missing.is_empty() {
        record_upload_error("incomplete_upload");
        tracing::warn!(
            upload_id = %upload_id,
            missing_count = missing.len(),
            total_chunks = session.total_chunks,
            "Finalize rejected: upload incomplete"
        );
        return Err(ApiError::IncompleteUpload {
            missing_indices: missing,
            total: session.total_chunks,
        });
    }

    // Claim the session. A concurrent finalize that won the transition makes
    // this fail with Conflict.
    let row = state
        .sessions
        .begin_finalize(upload_id, OffsetDateTime::now_utc())
        .await?;
    let session = row.to_session()?;

    let size_bytes = match reassemble_session(state.storage.as_ref(), &session).await {
        Ok(size) => size,
        Err(e) => {
            REASSEMBLY_FAILURES.inc();
            record_upload_error("reassembly_failed");
            // Hand the session back so finalize can be retried without
            // re-sending any chunks.
            match state
                .sessions
                .reopen_session(upload_id, OffsetDateTime::now_utc())
                .await
            {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    upload_id = %upload_id,
                    "Session no longer finalizing while reopening after failed reassembly"
                ),
                Err(reopen_err) => tracing::error!(
                    upload_id = %upload_id,
                    error = %reopen_err,
                    "Failed to reopen session after failed reassembly"
                ),
            }
            return Err(e);
        }
    };

    // The artifact is durable; the session row is bookkeeping now. A failed
    // delete leaves a stuck finalizing row for the sweep to reclaim.
    if let Err(e) = state.sessions.delete_session(upload_id).await {
        tracing::warn!(
            upload_id = %upload_id,
            error = %e,
            "Failed to delete session after successful finalize"
        );
    }

    let result = UploadResult {
        public_url: state.config.server.public_url(&session.destination_path),
        stored_path: session.destination_path.clone(),
        size_bytes,
    };

    UPLOAD_SESSIONS_FINALIZED.inc();
    FINALIZE_DURATION.observe(start_time.elapsed().as_secs_f64());
    tracing::info!(
        upload_id = %upload_id,
        stored_path = %result.stored_path,
        size_bytes = size_bytes,
        duration_secs = start_time.elapsed().as_secs_f64(),
        "Upload finalized"
    );

    Ok(Json(result))
}

/// DELETE /v1/uploads/{upload_id} - Abort an upload and tear down its state.
///
/// Idempotent: aborting an unknown or already-torn-down session succeeds as
/// a no-op.
#[tracing::instrument(skip(state), fields(upload_id = %upload_id))]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<StatusCode> {
    let upload_id = parse_upload_id(&upload_id)?;

    let Some(row) = state.sessions.get_session(upload_id).await? else {
        return Ok(StatusCode::NO_CONTENT);
    };
    let session = row.to_session()?;

    let deleted = remove_chunk_objects(
        state.storage.as_ref(),
        &session.destination_path,
        session.total_chunks,
    )
    .await;

    state.sessions.delete_session(upload_id).await?;

    UPLOAD_SESSIONS_ABORTED.inc();
    tracing::info!(
        upload_id = %upload_id,
        chunks_deleted = deleted,
        "Aborted upload session"
    );

    Ok(StatusCode::NO_CONTENT)
}
