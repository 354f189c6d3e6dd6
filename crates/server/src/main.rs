//! Gantry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use gantry_core::config::AppConfig;
use gantry_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Gantry - A resumable artifact upload service
#[derive(Parser, Debug)]
#[command(name = "gantryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "GANTRY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Gantry v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // Check for GANTRY_ environment variables (excluding GANTRY_CONFIG which is just the path)
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("GANTRY_") && key != "GANTRY_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: gantryd --config /path/to/config.toml\n  \
             2. Environment variables: GANTRY_SERVER__BIND=0.0.0.0:8080 \
             GANTRY_STORAGE__TYPE=filesystem gantryd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set GANTRY_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("GANTRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // Register Prometheus metrics
    gantry_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Initialize storage backend
    let storage = gantry_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!("Storage backend initialized");

    // Verify storage connectivity before accepting requests.
    // This catches configuration errors and connectivity issues early,
    // preventing the server from reporting healthy when storage is unreachable.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    // Initialize session store
    let sessions = gantry_sessions::from_config(&config.sessions)
        .await
        .context("failed to initialize session store")?;
    tracing::info!("Session store initialized");

    // Create application state
    let state = AppState::new(config.clone(), storage, sessions);

    // Spawn the orphan sweep if enabled
    if config.sweep.enabled {
        gantry_server::sweep::spawn_sweep_task(state.clone());
        tracing::info!(
            interval_secs = config.sweep.interval_secs,
            stale_after_secs = config.sweep.stale_after_secs,
            "Orphan sweep task spawned"
        );
    } else {
        tracing::info!("Orphan sweep disabled");
    }

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
