//! HTTP API server for the Gantry upload service.
//!
//! This crate provides the HTTP control plane:
//! - Upload session management
//! - Chunk receipt endpoints
//! - Finalize with streaming reassembly
//! - Abort and teardown of transient chunks
//! - Background sweep of abandoned sessions

pub mod cleanup;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod reassembly;
pub mod routes;
pub mod state;
pub mod sweep;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
