//! PostgreSQL-based session store implementation.

use crate::error::{SessionStoreError, SessionStoreResult};
use crate::models::{SessionChunkRow, UploadSessionRow};
use crate::store::SessionStore;
use async_trait::async_trait;
use gantry_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based session store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(url: &str, max_connections: u32) -> SessionStoreResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, enabling better
    /// secret management (e.g., passwords via environment variables).
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
    ) -> SessionStoreResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections).await
    }

    async fn connect(opts: PgConnectOptions, max_connections: u32) -> SessionStoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn migrate(&self) -> SessionStoreResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared
        // statement, so the schema is split and executed one at a time.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
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
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
            "SELECT * FROM upload_sessions WHERE upload_id = $1",
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
        // The conditional UPDATE row-locks, so two finalizes can't both
        // observe state='open' and proceed; losers see zero rows.
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE upload_sessions SET state = 'finalizing', updated_at = $1 WHERE upload_id = $2 AND state = 'open'",
        )
        .bind(updated_at)
        .bind(upload_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let state: Option<String> =
                sqlx::query_scalar("SELECT state FROM upload_sessions WHERE upload_id = $1")
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
            "SELECT * FROM upload_sessions WHERE upload_id = $1",
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
            "UPDATE upload_sessions SET state = 'open', updated_at = $1 WHERE upload_id = $2 AND state = 'finalizing'",
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

        let touched = sqlx::query(
            "UPDATE upload_sessions SET updated_at = $1 WHERE upload_id = $2 AND state = 'open'",
        )
        .bind(received_at)
        .bind(upload_id)
        .execute(&mut *tx)
        .await?;

        if touched.rows_affected() == 0 {
            let state: Option<String> =
                sqlx::query_scalar("SELECT state FROM upload_sessions WHERE upload_id = $1")
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
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (upload_id, chunk_index) DO UPDATE
            SET size_bytes = EXCLUDED.size_bytes, received_at = EXCLUDED.received_at
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
            "SELECT * FROM session_chunks WHERE upload_id = $1 ORDER BY chunk_index",
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_received(&self, upload_id: Uuid) -> SessionStoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM session_chunks WHERE upload_id = $1")
                .bind(upload_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn delete_session(&self, upload_id: Uuid) -> SessionStoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM session_chunks WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM upload_sessions WHERE upload_id = $1")
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
            "SELECT * FROM upload_sessions WHERE state = 'open' AND updated_at < $1 ORDER BY updated_at LIMIT $2",
        )
        .bind(older_than)
        .bind(i64::from(limit))
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
            "SELECT * FROM upload_sessions WHERE state = 'finalizing' AND updated_at < $1 ORDER BY updated_at LIMIT $2",
        )
        .bind(older_than)
        .bind(i64::from(limit))
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

/// SQL schema for PostgreSQL.
const POSTGRES_SCHEMA: &str = r#"
-- Upload sessions
CREATE TABLE IF NOT EXISTS upload_sessions (
    upload_id UUID PRIMARY KEY,
    bucket TEXT NOT NULL,
    destination_path TEXT NOT NULL,
    content_type TEXT NOT NULL,
    total_chunks BIGINT NOT NULL,
    state TEXT NOT NULL DEFAULT 'open',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_state ON upload_sessions(state, updated_at);

-- Received chunks, one row per acknowledged index
CREATE TABLE IF NOT EXISTS session_chunks (
    upload_id UUID NOT NULL REFERENCES upload_sessions(upload_id) ON DELETE CASCADE,
    chunk_index BIGINT NOT NULL,
    size_bytes BIGINT NOT NULL,
    received_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (upload_id, chunk_index)
);
"#;
