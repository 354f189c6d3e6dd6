//! Health and capability discovery endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use gantry_core::upload::CapabilitiesResponse;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health
///
/// This endpoint is intentionally unauthenticated to support load balancer
/// probes and monitoring systems. It fails with 503 when either backing
/// store is unreachable, so an unhealthy instance drops out of rotation
/// before requests start failing mid-upload.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state
        .sessions
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("session store unreachable: {e}")))?;
    state
        .storage
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(format!("storage unreachable: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /v1/capabilities
pub async fn get_capabilities(
    State(state): State<AppState>,
) -> ApiResult<Json<CapabilitiesResponse>> {
    Ok(Json(CapabilitiesResponse {
        api_version: "v1".to_string(),
        max_artifact_bytes: gantry_core::MAX_ARTIFACT_BYTES,
        max_chunk_payload_bytes: state.config.server.max_chunk_payload_bytes,
    }))
}
