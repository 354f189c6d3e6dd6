//! Upload session store abstraction and implementations for Gantry.
//!
//! This crate provides the control-plane data model:
//! - Upload session rows and their open/finalizing lifecycle
//! - Per-session received-chunk ledger
//! - Backends: SQLite (single-node) and PostgreSQL

pub mod error;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::{SessionStoreError, SessionStoreResult};
pub use postgres::PostgresStore;
pub use store::{SessionStore, SqliteStore};

use gantry_core::config::SessionStoreConfig;
use std::sync::Arc;

/// Create a session store from configuration.
pub async fn from_config(config: &SessionStoreConfig) -> SessionStoreResult<Arc<dyn SessionStore>> {
    config.validate().map_err(SessionStoreError::Config)?;

    match config {
        SessionStoreConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn SessionStore>)
        }
        SessionStoreConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
        } => {
            let store = if let Some(url) = url {
                // URL takes precedence when both are provided
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections).await?
            } else if let (Some(host), Some(database)) = (host.as_ref(), database.as_ref()) {
                PostgresStore::from_params(
                    host,
                    port.unwrap_or(5432),
                    username.as_deref(),
                    password.as_deref(),
                    database,
                    *ssl_mode,
                    *max_connections,
                )
                .await?
            } else {
                return Err(SessionStoreError::Config(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn SessionStore>)
        }
    }
}
