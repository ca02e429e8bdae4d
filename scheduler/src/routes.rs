use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the management API router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Management operations
        .route("/api/jobs", get(handlers::list_jobs))
        .route("/api/schedule", get(handlers::list_schedule))
        .route("/api/jobs/:key/run-now", post(handlers::run_job_now))
        .route(
            "/api/jobs/:key/run-after-delay",
            post(handlers::run_job_after_delay),
        )
        // Metrics endpoint (no authentication for Prometheus scraping)
        .route("/metrics", get(handlers::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
