//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL reassembled artifacts are served from. The public URL of an
    /// artifact is `{public_base_url}/{destination_path}`.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Maximum accepted chunk payload in bytes.
    ///
    /// Must be at least the direct-upload ceiling, since a direct upload
    /// arrives as one chunk carrying the whole artifact.
    #[serde(default = "default_max_chunk_payload_bytes")]
    pub max_chunk_payload_bytes: u64,
    /// Maximum chunks a single session may declare.
    #[serde(default = "default_max_chunks_per_session")]
    pub max_chunks_per_session: u32,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// When enabled, restrict this endpoint to authorized scraper IPs at the
    /// infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/artifacts".to_string()
}

fn default_max_chunk_payload_bytes() -> u64 {
    12 * 1024 * 1024 // 12 MiB, headroom over the 10 MiB direct ceiling
}

fn default_max_chunks_per_session() -> u32 {
    1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
            max_chunk_payload_bytes: default_max_chunk_payload_bytes(),
            max_chunks_per_session: default_max_chunks_per_session(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_payload_bytes < crate::MAX_DIRECT_BYTES {
            return Err(format!(
                "server.max_chunk_payload_bytes {} is below the direct-upload ceiling {}",
                self.max_chunk_payload_bytes,
                crate::MAX_DIRECT_BYTES
            ));
        }
        if self.max_chunks_per_session == 0 {
            return Err("server.max_chunks_per_session cannot be 0".to_string());
        }
        if self.public_base_url.trim_end_matches('/').is_empty() {
            return Err("server.public_base_url cannot be empty".to_string());
        }
        Ok(())
    }

    /// Public URL for an artifact stored at `destination_path`.
    pub fn public_url(&self, destination_path: &str) -> String {
        format!(
            "{}/{destination_path}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of
        /// `bucket.endpoint/key`). Required for MinIO and some S3-compatible
        /// services; AWS S3 itself requires virtual-hosted style (false).
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Session store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionStoreConfig {
    /// SQLite database (recommended for testing and single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer the GANTRY_SESSIONS__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_max_connections() -> u32 {
    10
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/sessions.db"),
        }
    }
}

impl SessionStoreConfig {
    /// Validate session store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            SessionStoreConfig::Sqlite { .. } => Ok(()),
            SessionStoreConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Orphan sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Enable the background sweep (default: true).
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,
    /// Seconds between sweep cycles.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Reap open sessions idle longer than this many seconds.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Return sessions stuck in finalizing to open after this many seconds.
    #[serde(default = "default_finalizing_stale_after_secs")]
    pub finalizing_stale_after_secs: u64,
    /// Maximum sessions reclaimed per cycle.
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: u32,
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_stale_after_secs() -> u64 {
    3600 // 1 hour
}

fn default_finalizing_stale_after_secs() -> u64 {
    600 // 10 minutes
}

fn default_sweep_batch_size() -> u32 {
    100
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            interval_secs: default_sweep_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            finalizing_stale_after_secs: default_finalizing_stale_after_secs(),
            batch_size: default_sweep_batch_size(),
        }
    }
}

impl SweepConfig {
    /// Get the cycle interval as a std::time::Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Get the open-session staleness window as a Duration.
    pub fn stale_after(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX))
    }

    /// Get the finalizing staleness window as a Duration.
    pub fn finalizing_stale_after(&self) -> Duration {
        Duration::seconds(i64::try_from(self.finalizing_stale_after_secs).unwrap_or(i64::MAX))
    }

    /// Validate sweep configuration for dangerous settings.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        // A zero interval would panic when creating the tokio timer.
        if self.interval_secs == 0 {
            return Err(
                "sweep.interval_secs cannot be 0. Use a value >= 1 second.".to_string()
            );
        }
        if self.batch_size == 0 {
            return Err("sweep.batch_size cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Session store configuration.
    #[serde(default)]
    pub sessions: SessionStoreConfig,
    /// Orphan sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            sessions: SessionStoreConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate all sections, failing on the first offending setting.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.sessions.validate()?;
        self.sweep.validate()?;
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite sessions, and
    /// disables the background sweep.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            sessions: SessionStoreConfig::default(),
            sweep: SweepConfig {
                enabled: false,
                ..SweepConfig::default()
            },
        }
    }
}
