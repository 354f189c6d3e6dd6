//! Server test utilities.

use gantry_core::config::{AppConfig, SessionStoreConfig, StorageConfig, SweepConfig};
use gantry_server::{AppState, create_router};
use gantry_sessions::{SessionStore, SqliteStore};
use gantry_storage::{FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::build(|_| {}, |storage| storage).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, |storage| storage).await
    }

    /// Create a test server whose object store is wrapped, e.g. to inject
    /// failures.
    pub async fn with_storage<W>(wrap: W) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        Self::build(|_| {}, wrap).await
    }

    async fn build<F, W>(modifier: F, wrap: W) -> Self
    where
        F: FnOnce(&mut AppConfig),
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        // Idempotent, so every test file can call it freely
        gantry_server::metrics::register_metrics();

        // Create storage
        let storage_path = temp_dir.path().join("storage");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");
        let storage: Arc<dyn ObjectStore> = wrap(Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        ));

        // Create session store
        let db_path = temp_dir.path().join("sessions.db");
        let sessions: Arc<dyn SessionStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create session store"),
        );

        let mut config = AppConfig {
            server: Default::default(),
            storage: StorageConfig::Filesystem {
                path: storage_path.clone(),
            },
            sessions: SessionStoreConfig::Sqlite { path: db_path },
            sweep: SweepConfig {
                enabled: false,
                ..Default::default()
            },
        };

        // Apply user modifications
        modifier(&mut config);

        // Create state
        let state = AppState::new(config, storage, sessions);

        // Create router
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying session store.
    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        self.state.sessions.clone()
    }

    /// Get access to the underlying object store.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }
}
