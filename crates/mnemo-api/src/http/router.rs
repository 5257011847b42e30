//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` except `/health`.
//! Middleware: CORS, request tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/threads", get(handlers::threads::list_threads))
        .route("/threads/{id}/respond", post(handlers::threads::respond))
        .route(
            "/threads/{id}/turns",
            get(handlers::threads::list_turns).post(handlers::threads::record_turn),
        )
        .route("/threads/{id}/search", post(handlers::memory::search))
        .route("/threads/{id}/profile", get(handlers::memory::get_profile))
        .route("/threads/{id}/summary", get(handlers::memory::get_summary))
        .route("/jobs", get(handlers::jobs::list_jobs));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
