//! Session store test utilities.

use gantry_sessions::{PostgresStore, SessionStore, SessionStoreResult, SqliteStore};
use sqlx::{Pool, Postgres as SqlxPostgres, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A test session store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestSessions {
    pub store: Arc<dyn SessionStore>,
    pub(crate) sqlite_store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestSessions {
    /// Create a new test session store backed by a temp-file SQLite database.
    pub async fn new() -> SessionStoreResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = SqliteStore::new(&db_path).await?;
        let arc_store = Arc::new(store);

        Ok(Self {
            store: arc_store.clone(),
            sqlite_store: arc_store,
            _temp_dir: temp_dir,
        })
    }

    /// Create a new in-memory SQLite store (faster for tests).
    pub async fn in_memory() -> SessionStoreResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(":memory:").await?;
        let arc_store = Arc::new(store);

        Ok(Self {
            store: arc_store.clone(),
            sqlite_store: arc_store,
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the session store.
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }
}

/// PostgreSQL test session store wrapper that manages a testcontainer.
#[allow(dead_code)]
pub struct PostgresTestSessions {
    pub store: Arc<dyn SessionStore>,
    pub(crate) postgres_store: Arc<PostgresStore>,
    _container: ContainerAsync<Postgres>,
}

#[allow(dead_code)]
impl PostgresTestSessions {
    /// Create a new PostgreSQL test store with a testcontainer.
    pub async fn new() -> SessionStoreResult<Self> {
        // Start PostgreSQL container
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                gantry_sessions::SessionStoreError::Internal(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let store = PostgresStore::from_url(&url, 5).await?;
        let arc_store = Arc::new(store);

        Ok(Self {
            store: arc_store.clone(),
            postgres_store: arc_store,
            _container: container,
        })
    }

    /// Get a reference to the session store.
    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Get a reference to the PostgreSQL connection pool for raw queries.
    pub fn pool(&self) -> &Pool<SqlxPostgres> {
        self.postgres_store.pool()
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
#[allow(dead_code)]
pub async fn run_session_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn SessionStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    // Test with SQLite backend
    let sqlite = TestSessions::new()
        .await
        .expect("Failed to create SQLite test sessions");
    test_fn.clone()(sqlite.store()).await;

    // Test with PostgreSQL backend (requires Docker)
    if std::env::var("SKIP_POSTGRES_TESTS").is_err() {
        match PostgresTestSessions::new().await {
            Ok(postgres) => {
                test_fn(postgres.store()).await;
            }
            Err(err) => {
                eprintln!("Skipping PostgreSQL session tests: {err}");
            }
        }
    }
}
