//! Teardown of transient chunk objects.
//!
//! Shared by the abort operation and the orphan sweep. Chunk keys are derived
//! from the session's declared chunk count rather than listed from the
//! backend, so a listing outage cannot block teardown.

use gantry_core::upload::chunk_object_key;
use gantry_storage::ObjectStore;

/// Delete the transient chunk objects belonging to a session.
///
/// Not-found deletes are skipped silently: a chunk may never have arrived, or
/// a previous teardown already removed it. Other storage failures are logged
/// and skipped so teardown always runs to the last index. Returns the number
/// of objects actually deleted.
pub async fn remove_chunk_objects(
    storage: &dyn ObjectStore,
    destination_path: &str,
    total_chunks: u32,
) -> u32 {
    let mut deleted = 0;
    for index in 0..total_chunks {
        let key = chunk_object_key(destination_path, index);
        match storage.delete(&key).await {
            Ok(()) => deleted += 1,
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to delete transient chunk object");
            }
        }
    }
    deleted
}
