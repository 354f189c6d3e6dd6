//! Streaming reassembly of acknowledged chunks into the final artifact.

use crate::cleanup::remove_chunk_objects;
use crate::error::{ApiError, ApiResult};
use futures::StreamExt;
use gantry_core::upload::{UploadSession, chunk_object_key};
use gantry_storage::{ObjectStore, StorageResult, StreamingUpload};

/// Concatenate every chunk of a fully acknowledged session, in ascending
/// index order, into one object at the session's destination path.
///
/// Chunks are streamed frame by frame, so the artifact is never held whole in
/// memory. Any chunk read or write failure aborts the streaming upload and
/// surfaces as `ReassemblyFailed`; the transient chunk objects are left in
/// place so a later finalize can retry without re-sending anything. On
/// success the chunk objects are deleted best-effort and the total bytes
/// written are returned.
pub async fn reassemble_session(
    storage: &dyn ObjectStore,
    session: &UploadSession,
) -> ApiResult<u64> {
    let mut upload = storage
        .put_stream(&session.destination_path, Some(&session.content_type))
        .await
        .map_err(|e| {
            ApiError::ReassemblyFailed(format!("failed to start streaming upload: {e}"))
        })?;

    for index in 0..session.total_chunks {
        let key = chunk_object_key(&session.destination_path, index);
        if let Err(e) = copy_chunk(storage, &key, upload.as_mut()).await {
            tracing::warn!(
                upload_id = %session.upload_id,
                chunk_index = index,
                error = %e,
                "Reassembly failed streaming chunk"
            );
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(error = %abort_err, "Failed to abort streaming upload");
            }
            return Err(ApiError::ReassemblyFailed(format!("chunk {index}: {e}")));
        }
    }

    let size_bytes = upload.finish().await.map_err(|e| {
        ApiError::ReassemblyFailed(format!("failed to finish streaming upload: {e}"))
    })?;

    // The artifact is durable at this point; leftover chunk objects only
    // waste space until the next teardown touches them.
    let deleted =
        remove_chunk_objects(storage, &session.destination_path, session.total_chunks).await;
    tracing::debug!(
        upload_id = %session.upload_id,
        size_bytes = size_bytes,
        chunks_deleted = deleted,
        "Reassembled artifact and removed transient chunks"
    );

    Ok(size_bytes)
}

async fn copy_chunk(
    storage: &dyn ObjectStore,
    key: &str,
    upload: &mut dyn StreamingUpload,
) -> StorageResult<()> {
    let mut stream = storage.get_stream(key).await?;
    while let Some(frame) = stream.next().await {
        upload.write(frame?).await?;
    }
    Ok(())
}
