//! Integration tests for SessionStore implementations.
//!
//! Every test runs against SQLite and, when Docker is available, against
//! PostgreSQL via testcontainers. Set SKIP_POSTGRES_TESTS=1 to pin to SQLite.

mod common;

use common::run_session_test_both;
use gantry_core::upload::{SessionState, UploadSession};
use gantry_sessions::SessionStoreError;
use gantry_sessions::models::UploadSessionRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn open_session_row(total_chunks: u32) -> UploadSessionRow {
    let session = UploadSession::new("creatives", "image/png", total_chunks).unwrap();
    UploadSessionRow::from_session(&session)
}

fn aged_row(state: SessionState, age: Duration) -> UploadSessionRow {
    let mut session = UploadSession::new("creatives", "image/png", 4).unwrap();
    session.state = state;

    let mut row = UploadSessionRow::from_session(&session);
    row.created_at = OffsetDateTime::now_utc() - age;
    row.updated_at = row.created_at;
    row
}

#[tokio::test]
async fn test_session_lifecycle() {
    run_session_test_both(|store| async move {
        let row = open_session_row(8);
        store.create_session(&row).await.expect("Create failed");

        let retrieved = store
            .get_session(row.upload_id)
            .await
            .expect("Get failed")
            .expect("Session not found");
        assert_eq!(retrieved.bucket, "creatives");
        assert_eq!(retrieved.destination_path, row.destination_path);
        assert_eq!(retrieved.content_type, "image/png");
        assert_eq!(retrieved.total_chunks, 8);
        assert_eq!(retrieved.state, "open");

        store
            .delete_session(row.upload_id)
            .await
            .expect("Delete failed");
        assert!(
            store
                .get_session(row.upload_id)
                .await
                .expect("Get failed")
                .is_none()
        );

        // Unknown sessions read back as absent, not as errors
        assert!(
            store
                .get_session(Uuid::new_v4())
                .await
                .expect("Get failed")
                .is_none()
        );
    })
    .await;
}

#[tokio::test]
async fn test_begin_finalize_claims_exactly_once() {
    run_session_test_both(|store| async move {
        let row = open_session_row(2);
        store.create_session(&row).await.expect("Create failed");

        let claimed = store
            .begin_finalize(row.upload_id, OffsetDateTime::now_utc())
            .await
            .expect("First claim failed");
        assert!(claimed.is_state(SessionState::Finalizing));

        // A second claim loses: the session is no longer open
        match store
            .begin_finalize(row.upload_id, OffsetDateTime::now_utc())
            .await
        {
            Err(SessionStoreError::Conflict(msg)) => assert!(msg.contains("finalizing")),
            other => panic!("expected conflict, got {other:?}"),
        }

        match store
            .begin_finalize(Uuid::new_v4(), OffsetDateTime::now_utc())
            .await
        {
            Err(SessionStoreError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    })
    .await;
}

#[tokio::test]
async fn test_reopen_returns_session_to_open() {
    run_session_test_both(|store| async move {
        let row = open_session_row(2);
        store.create_session(&row).await.expect("Create failed");
        store
            .begin_finalize(row.upload_id, OffsetDateTime::now_utc())
            .await
            .expect("Claim failed");

        let reopened = store
            .reopen_session(row.upload_id, OffsetDateTime::now_utc())
            .await
            .expect("Reopen failed");
        assert!(reopened);

        let retrieved = store
            .get_session(row.upload_id)
            .await
            .expect("Get failed")
            .expect("Session not found");
        assert!(retrieved.is_state(SessionState::Open));

        // Reopening an already-open session reports nothing to do
        let reopened = store
            .reopen_session(row.upload_id, OffsetDateTime::now_utc())
            .await
            .expect("Reopen failed");
        assert!(!reopened);
    })
    .await;
}

#[tokio::test]
async fn test_chunk_receipts_upsert_by_index() {
    run_session_test_both(|store| async move {
        let row = open_session_row(4);
        store.create_session(&row).await.expect("Create failed");

        store
            .mark_chunk_received(row.upload_id, 2, 100, OffsetDateTime::now_utc())
            .await
            .expect("Mark failed");
        store
            .mark_chunk_received(row.upload_id, 2, 200, OffsetDateTime::now_utc())
            .await
            .expect("Re-mark failed");

        assert_eq!(
            store
                .count_received(row.upload_id)
                .await
                .expect("Count failed"),
            1
        );

        let chunks = store
            .received_chunks(row.upload_id)
            .await
            .expect("List failed");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 2);
        assert_eq!(chunks[0].size_bytes, 200);
    })
    .await;
}

#[tokio::test]
async fn test_chunk_receipts_fail_closed() {
    run_session_test_both(|store| async move {
        // No session at all
        match store
            .mark_chunk_received(Uuid::new_v4(), 0, 10, OffsetDateTime::now_utc())
            .await
        {
            Err(SessionStoreError::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }

        // Session exists but finalize already claimed it
        let row = open_session_row(2);
        store.create_session(&row).await.expect("Create failed");
        store
            .begin_finalize(row.upload_id, OffsetDateTime::now_utc())
            .await
            .expect("Claim failed");

        match store
            .mark_chunk_received(row.upload_id, 0, 10, OffsetDateTime::now_utc())
            .await
        {
            Err(SessionStoreError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    })
    .await;
}

#[tokio::test]
async fn test_received_chunks_ordered_by_index() {
    run_session_test_both(|store| async move {
        let row = open_session_row(4);
        store.create_session(&row).await.expect("Create failed");

        for index in [3u32, 0, 2] {
            store
                .mark_chunk_received(row.upload_id, index, 10, OffsetDateTime::now_utc())
                .await
                .expect("Mark failed");
        }

        let indices: Vec<i64> = store
            .received_chunks(row.upload_id)
            .await
            .expect("List failed")
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(indices, vec![0, 2, 3]);
    })
    .await;
}

#[tokio::test]
async fn test_delete_session_removes_receipts() {
    run_session_test_both(|store| async move {
        let row = open_session_row(2);
        store.create_session(&row).await.expect("Create failed");
        store
            .mark_chunk_received(row.upload_id, 0, 10, OffsetDateTime::now_utc())
            .await
            .expect("Mark failed");

        store
            .delete_session(row.upload_id)
            .await
            .expect("Delete failed");

        assert_eq!(
            store
                .count_received(row.upload_id)
                .await
                .expect("Count failed"),
            0
        );
    })
    .await;
}

#[tokio::test]
async fn test_stale_session_queries() {
    run_session_test_both(|store| async move {
        let oldest_open = aged_row(SessionState::Open, Duration::hours(3));
        let old_open = aged_row(SessionState::Open, Duration::hours(2));
        let fresh_open = aged_row(SessionState::Open, Duration::seconds(5));
        let stuck = aged_row(SessionState::Finalizing, Duration::minutes(30));
        let fresh_finalizing = aged_row(SessionState::Finalizing, Duration::seconds(5));

        for row in [
            &oldest_open,
            &old_open,
            &fresh_open,
            &stuck,
            &fresh_finalizing,
        ] {
            store.create_session(row).await.expect("Create failed");
        }

        let now = OffsetDateTime::now_utc();

        let stale = store
            .get_stale_open_sessions(now - Duration::hours(1), 10)
            .await
            .expect("Stale query failed");
        let stale_ids: Vec<Uuid> = stale.iter().map(|r| r.upload_id).collect();
        assert_eq!(stale_ids, vec![oldest_open.upload_id, old_open.upload_id]);

        // The limit keeps cycles bounded, oldest first
        let stale = store
            .get_stale_open_sessions(now - Duration::hours(1), 1)
            .await
            .expect("Stale query failed");
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].upload_id, oldest_open.upload_id);

        let stuck_rows = store
            .get_stuck_finalizing_sessions(now - Duration::minutes(10), 10)
            .await
            .expect("Stuck query failed");
        assert_eq!(stuck_rows.len(), 1);
        assert_eq!(stuck_rows[0].upload_id, stuck.upload_id);
    })
    .await;
}

#[tokio::test]
async fn test_count_active_sessions() {
    run_session_test_both(|store| async move {
        assert_eq!(store.count_active_sessions().await.expect("Count failed"), 0);

        store
            .create_session(&open_session_row(1))
            .await
            .expect("Create failed");
        store
            .create_session(&aged_row(SessionState::Finalizing, Duration::seconds(1)))
            .await
            .expect("Create failed");

        assert_eq!(store.count_active_sessions().await.expect("Count failed"), 2);
    })
    .await;
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    run_session_test_both(|store| async move {
        // The harness already migrated once during setup
        store.migrate().await.expect("Second migrate failed");
        store.health_check().await.expect("Health check failed");
    })
    .await;
}
