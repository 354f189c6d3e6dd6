//! Core domain types and shared logic for the Gantry upload protocol.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload plans (direct vs. chunked, chunk size, parallelism)
//! - Chunk splitting into ordered byte ranges
//! - Upload session identifiers and lifecycle
//! - Progress projection
//! - The retry policy shared by transport layers

pub mod chunk;
pub mod config;
pub mod error;
pub mod plan;
pub mod progress;
pub mod retry;
pub mod upload;

pub use chunk::{ChunkSpec, ChunkSpecs, chunk_count, split};
pub use error::{Error, Result};
pub use plan::{UploadMethod, UploadPlan, plan_for_size};
pub use progress::{Phase, ProgressSnapshot, ProgressTracker};
pub use retry::RetryPolicy;
pub use upload::{SessionState, UploadId, UploadResult, UploadSession};

/// Largest artifact sent as a single request: 10 MiB
pub const MAX_DIRECT_BYTES: u64 = 10 * 1024 * 1024;

/// Largest artifact the service accepts at all: 50 MiB
pub const MAX_ARTIFACT_BYTES: u64 = 50 * 1024 * 1024;
