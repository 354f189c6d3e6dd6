//! Background reclamation of abandoned upload sessions.

use crate::cleanup::remove_chunk_objects;
use crate::metrics::{ACTIVE_UPLOAD_SESSIONS, SESSIONS_REAPED, SESSIONS_REOPENED, SWEEP_RUNS};
use crate::state::AppState;
use gantry_sessions::models::UploadSessionRow;
use time::OffsetDateTime;

/// Spawn the orphan sweep task.
///
/// Every cycle the sweep reaps open sessions that have been idle past the
/// staleness window (transient chunks deleted, row dropped) and returns
/// sessions stuck in finalizing to open so finalize can be retried after a
/// crash. Reclamations are independent: an error on one session is logged
/// and never stops the task.
pub fn spawn_sweep_task(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            run_sweep_cycle(&state).await;
        }
    })
}

/// Run one sweep cycle against the session store.
pub async fn run_sweep_cycle(state: &AppState) {
    SWEEP_RUNS.inc();
    let now = OffsetDateTime::now_utc();
    let batch = state.config.sweep.batch_size;

    match state
        .sessions
        .get_stale_open_sessions(now - state.config.sweep.stale_after(), batch)
        .await
    {
        Ok(rows) => {
            for row in rows {
                reap_session(state, &row).await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "Sweep failed to list stale open sessions"),
    }

    match state
        .sessions
        .get_stuck_finalizing_sessions(now - state.config.sweep.finalizing_stale_after(), batch)
        .await
    {
        Ok(rows) => {
            for row in rows {
                match state.sessions.reopen_session(row.upload_id, now).await {
                    Ok(true) => {
                        SESSIONS_REOPENED.inc();
                        tracing::info!(
                            upload_id = %row.upload_id,
                            stuck_since = %row.updated_at,
                            "Returned stuck finalizing session to open"
                        );
                    }
                    // Settled by a concurrent finalize or abort
                    Ok(false) => {}
                    Err(e) => tracing::warn!(
                        upload_id = %row.upload_id,
                        error = %e,
                        "Sweep failed to reopen stuck session"
                    ),
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "Sweep failed to list stuck finalizing sessions"),
    }

    match state.sessions.count_active_sessions().await {
        Ok(count) => ACTIVE_UPLOAD_SESSIONS.set(count as i64),
        Err(e) => tracing::debug!(error = %e, "Sweep failed to count active sessions"),
    }
}

async fn reap_session(state: &AppState, row: &UploadSessionRow) {
    let total_chunks = u32::try_from(row.total_chunks).unwrap_or(0);
    let deleted =
        remove_chunk_objects(state.storage.as_ref(), &row.destination_path, total_chunks).await;

    match state.sessions.delete_session(row.upload_id).await {
        Ok(()) => {
            SESSIONS_REAPED.inc();
            tracing::info!(
                upload_id = %row.upload_id,
                idle_since = %row.updated_at,
                chunks_deleted = deleted,
                "Reaped stale upload session"
            );
        }
        Err(e) => tracing::warn!(
            upload_id = %row.upload_id,
            error = %e,
            "Sweep failed to delete stale session"
        ),
    }
}
