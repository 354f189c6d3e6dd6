//! Command-line uploader for Gantry.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gantry_client::api::ApiClient;
use gantry_client::error::ClientError;
use gantry_client::source::ArtifactSource;
use gantry_client::transmitter::Transmitter;
use gantry_core::RetryPolicy;
use gantry_core::progress::ProgressSnapshot;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Upload client for the Gantry artifact service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server API URL
    #[arg(long, env = "GANTRY_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an artifact file
    Upload {
        /// Path to the artifact
        file: String,
        /// Logical bucket the artifact lands in
        #[arg(long, default_value = "creatives")]
        bucket: String,
        /// Override the content type inferred from the file extension
        #[arg(long)]
        content_type: Option<String>,
        /// Resume an interrupted session instead of starting a new one
        #[arg(long, value_name = "UPLOAD_ID")]
        resume: Option<String>,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show the state of an upload session
    Status {
        upload_id: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Finalize a fully uploaded session
    Finalize {
        upload_id: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Abort a session and delete its stored chunks
    Abort {
        upload_id: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health and advertised limits
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Upload {
            file,
            bucket,
            content_type,
            resume,
            api,
        } => handle_upload(&file, &bucket, content_type.as_deref(), resume.as_deref(), &api).await,
        Commands::Status { upload_id, api } => handle_status(&upload_id, &api).await,
        Commands::Finalize { upload_id, api } => handle_finalize(&upload_id, &api).await,
        Commands::Abort { upload_id, api } => handle_abort(&upload_id, &api).await,
        Commands::Health { api } => handle_health(&api).await,
    }
}

async fn handle_upload(
    file: &str,
    bucket: &str,
    content_type: Option<&str>,
    resume: Option<&str>,
    api: &ApiArgs,
) -> Result<()> {
    let client = ApiClient::new(&api.server)?;
    let mut source = ArtifactSource::open(file)
        .await
        .with_context(|| format!("failed to open {file}"))?;
    if let Some(content_type) = content_type {
        source = source.with_content_type(content_type);
    }

    match resume {
        Some(upload_id) => println!("Resuming upload {upload_id} from {file}..."),
        None => println!(
            "Uploading {file} ({} bytes, {}) to bucket \"{bucket}\"...",
            source.size(),
            source.content_type()
        ),
    }

    let transmitter = Transmitter::new(client);
    let outcome = match resume {
        Some(upload_id) => {
            transmitter
                .resume(upload_id, &mut source, print_progress)
                .await
        }
        None => transmitter.upload(&mut source, bucket, print_progress).await,
    };
    eprintln!(); // newline after progress
    let result = outcome?;

    println!("✓ Uploaded {file}");
    println!("\nPublic URL: {}", result.public_url);
    println!("Stored path: {}", result.stored_path);
    println!("Size: {} bytes", result.size_bytes);
    Ok(())
}

async fn handle_status(upload_id: &str, api: &ApiArgs) -> Result<()> {
    let client = ApiClient::new(&api.server)?;
    let status = client.get_status(upload_id).await?;

    println!("State: {}", status.state);
    println!(
        "Chunks: {}/{} received",
        status.chunks_received, status.total_chunks
    );
    if !status.missing_indices.is_empty() {
        println!("Missing indices: {:?}", status.missing_indices);
    }
    Ok(())
}

async fn handle_finalize(upload_id: &str, api: &ApiArgs) -> Result<()> {
    let client = ApiClient::new(&api.server)?;

    println!("Finalizing {upload_id}...");
    let result = RetryPolicy::default()
        .run(ClientError::is_retryable, |_| client.finalize(upload_id))
        .await?;

    println!("✓ Finalized");
    println!("\nPublic URL: {}", result.public_url);
    println!("Stored path: {}", result.stored_path);
    println!("Size: {} bytes", result.size_bytes);
    Ok(())
}

async fn handle_abort(upload_id: &str, api: &ApiArgs) -> Result<()> {
    let client = ApiClient::new(&api.server)?;
    client.abort(upload_id).await?;
    println!("✓ Aborted {upload_id}");
    Ok(())
}

async fn handle_health(api: &ApiArgs) -> Result<()> {
    let client = ApiClient::new(&api.server)?;

    let health = client.health().await?;
    println!("Server status: {}", health.status);
    println!("Version: {}", health.version);

    let caps = client.capabilities().await?;
    println!("\nAPI version: {}", caps.api_version);
    println!("Max artifact: {} bytes", caps.max_artifact_bytes);
    println!("Max chunk payload: {} bytes", caps.max_chunk_payload_bytes);
    Ok(())
}

fn print_progress(snapshot: ProgressSnapshot) {
    eprint!(
        "\r  [{:<10}] {:>3}% ({}/{} chunks)",
        snapshot.phase.as_str(),
        snapshot.percentage,
        snapshot.chunks_acknowledged,
        snapshot.total_chunks
    );
}
