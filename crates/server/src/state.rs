//! Application state shared across handlers.

use gantry_core::config::AppConfig;
use gantry_sessions::SessionStore;
use gantry_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend holding transient chunks and final artifacts.
    pub storage: Arc<dyn ObjectStore>,
    /// Session store tracking in-flight uploads.
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            sessions,
        }
    }
}
