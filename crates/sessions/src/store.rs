//! Session store trait and SQLite implementation.

use crate::error::{SessionStoreError, SessionStoreResult};
use crate::models::{SessionChunkRow, UploadSessionRow};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Store for upload sessions and their received-chunk ledger.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> SessionStoreResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> SessionStoreResult<()>;

    /// Create a new upload session.
    async fn create_session(&self, session: &UploadSessionRow) -> SessionStoreResult<()>;

    /// Get an upload session by ID.
    async fn get_session(&self, upload_id: Uuid) -> SessionStoreResult<Option<UploadSessionRow>>;

    /// Atomically transition a session from 'open' to 'finalizing'.
    ///
    /// Returns the claimed session on success. Fails with NotFound if the
    /// session doesn't exist and Conflict if it is not 'open' (another
    /// finalize already claimed it), so at most one caller can ever hold the
    /// 'finalizing' state.
    async fn begin_finalize(
        &self,
        upload_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> SessionStoreResult<UploadSessionRow>;

    /// Transition a session from 'finalizing' back to 'open' so its chunks
    /// can be retried. Returns false if the session was not in 'finalizing'
    /// (e.g. it was aborted while reassembly was failing).
    async fn reopen_session(
        &self,
        upload_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> SessionStoreResult<bool>;

    /// Record receipt of one chunk and refresh the session's activity time.
    ///
    /// Re-sent indices overwrite the previous receipt. Fails with NotFound if
    /// the session doesn't exist and Conflict if it is no longer 'open', so a
    /// receipt can never be recorded against a session that finalize already
    /// claimed.
    async fn mark_chunk_received(
        &self,
        upload_id: Uuid,
        chunk_index: u32,
        size_bytes: u64,
        received_at: OffsetDateTime,
    ) -> SessionStoreResult<()>;

    /// Get received chunks for a session, ordered by index.
    async fn received_chunks(&self, upload_id: Uuid) -> SessionStoreResult<Vec<SessionChunkRow>>;

    /// Count distinct received chunks for a session.
    async fn count_received(&self, upload_id: Uuid) -> SessionStoreResult<u64>;

    /// Delete a session and its chunk receipts.
    async fn delete_session(&self, upload_id: Uuid) -> SessionStoreResult<()>;

    /// Get 'open' sessions with no activity since `older_than`, oldest first.
    async fn get_stale_open_sessions(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> SessionStoreResult<Vec<UploadSessionRow>>;

    /// Get sessions stuck in 'finalizing' and not updated since `older_than`,
    /// oldest first. Used by background recovery after a crashed finalize.
    async fn get_stuck_finalizing_sessions(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> SessionStoreResult<Vec<UploadSessionRow>>;

    /// Count sessions in any live state.
    async fn count_active_sessions(&self) -> SessionStoreResult<u64>;
}

/// SQLite-based session store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, running migrations.
    pub async fn new(path: impl AsRef<Path>) -> SessionStoreResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; using a single connection avoids
            // persistent "database is locked" failures under test/axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn migrate(&self) -> SessionStoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> SessionStoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_session(&self, session: &UploadSessionRow) -> SessionStoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                upload_id, bucket, destination_path, content_type,
                total_chunks, state, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.upload_id)
        .bind(&session.bucket)
        .bind(&session.destination_path)
        .bind(&session.content_type)
        .bind(session.total_chunks)
        .bind(&session.state)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, upload_id: Uuid) -> SessionStoreResult<Option<UploadSessionRow>> {
        let row = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn begin_finalize(
        &self,
        upload_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> SessionStoreResult<UploadSessionRow> {
        // The conditional UPDATE acquires SQLite's exclusive lock, so only one
        // concurrent finalize can flip the state; losers see zero rows.
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE upload_sessions SET state = 'finalizing', updated_at = ? WHERE upload_id = ? AND state = 'open'",
        )
        .bind(updated_at)
        .bind(upload_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let state: Option<String> =
                sqlx::query_scalar("SELECT state FROM upload_sessions WHERE upload_id = ?")
                    .bind(upload_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match state {
                None => Err(SessionStoreError::NotFound(format!(
                    "upload session {upload_id}"
                ))),
                Some(state) => Err(SessionStoreError::Conflict(format!(
                    "upload session {upload_id} is {state}, not open"
                ))),
            };
        }

        let session = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(session)
    }

    async fn reopen_session(
        &self,
        upload_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> SessionStoreResult<bool> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET state = 'open', updated_at = ? WHERE upload_id = ? AND state = 'finalizing'",
        )
        .bind(updated_at)
        .bind(upload_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_chunk_received(
        &self,
        upload_id: Uuid,
        chunk_index: u32,
        size_bytes: u64,
        received_at: OffsetDateTime,
    ) -> SessionStoreResult<()> {
        let size_bytes = i64::try_from(size_bytes).map_err(|_| {
            SessionStoreError::Internal(format!("chunk size out of range: {size_bytes}"))
        })?;

        let mut tx = self.pool.begin().await?;

        // Touching updated_at and requiring state='open' in one statement
        // closes the race where a finalize claims the session between the
        // handler's state check and the receipt insert.
        let touched =
            sqlx::query("UPDATE upload_sessions SET updated_at = ? WHERE upload_id = ? AND state = 'open'")
                .bind(received_at)
                .bind(upload_id)
                .execute(&mut *tx)
                .await?;

        if touched.rows_affected() == 0 {
            let state: Option<String> =
                sqlx::query_scalar("SELECT state FROM upload_sessions WHERE upload_id = ?")
                    .bind(upload_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match state {
                None => Err(SessionStoreError::NotFound(format!(
                    "upload session {upload_id}"
                ))),
                Some(state) => Err(SessionStoreError::Conflict(format!(
                    "upload session {upload_id} is {state}, not open"
                ))),
            };
        }

        sqlx::query(
            r#"
            INSERT INTO session_chunks (upload_id, chunk_index, size_bytes, received_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(upload_id, chunk_index) DO UPDATE
            SET size_bytes = excluded.size_bytes, received_at = excluded.received_at
            "#,
        )
        .bind(upload_id)
        .bind(i64::from(chunk_index))
        .bind(size_bytes)
        .bind(received_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn received_chunks(&self, upload_id: Uuid) -> SessionStoreResult<Vec<SessionChunkRow>> {
        let rows = sqlx::query_as::<_, SessionChunkRow>(
            "SELECT * FROM session_chunks WHERE upload_id = ? ORDER BY chunk_index",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_received(&self, upload_id: Uuid) -> SessionStoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM session_chunks WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn delete_session(&self, upload_id: Uuid) -> SessionStoreResult<()> {
        // Wrap both DELETEs in a transaction so a failure rolls back both
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM session_chunks WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM upload_sessions WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_stale_open_sessions(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> SessionStoreResult<Vec<UploadSessionRow>> {
        let rows = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE state = 'open' AND updated_at < ? ORDER BY updated_at LIMIT ?",
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_stuck_finalizing_sessions(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> SessionStoreResult<Vec<UploadSessionRow>> {
        let rows = sqlx::query_as::<_, UploadSessionRow>(
            "SELECT * FROM upload_sessions WHERE state = 'finalizing' AND updated_at < ? ORDER BY updated_at LIMIT ?",
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_active_sessions(&self) -> SessionStoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM upload_sessions WHERE state IN ('open', 'finalizing')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Upload sessions
CREATE TABLE IF NOT EXISTS upload_sessions (
    upload_id BLOB PRIMARY KEY,
    bucket TEXT NOT NULL,
    destination_path TEXT NOT NULL,
    content_type TEXT NOT NULL,
    total_chunks INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_state ON upload_sessions(state, updated_at);

-- Received chunks, one row per acknowledged index
CREATE TABLE IF NOT EXISTS session_chunks (
    upload_id BLOB NOT NULL,
    chunk_index INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    PRIMARY KEY (upload_id, chunk_index),
    FOREIGN KEY (upload_id) REFERENCES upload_sessions(upload_id) ON DELETE CASCADE
);
"#;
