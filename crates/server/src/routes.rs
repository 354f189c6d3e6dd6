//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Capability discovery
        .route("/v1/capabilities", get(handlers::get_capabilities))
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Upload session lifecycle
        .route("/v1/uploads", post(handlers::create_upload))
        .route("/v1/uploads/{upload_id}", get(handlers::get_upload))
        .route("/v1/uploads/{upload_id}", delete(handlers::abort_upload))
        .route(
            "/v1/uploads/{upload_id}/chunks/{chunk_index}",
            put(handlers::receive_chunk),
        )
        .route(
            "/v1/uploads/{upload_id}/finalize",
            post(handlers::finalize_upload),
        );

    let mut router = Router::new().merge(api_routes);

    // Conditionally add metrics endpoint based on config.
    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    // See crate::metrics module documentation for details.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
