pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_user;
pub use rest::{
    health_handler, record_minutes_handler, streak_stats_handler, update_progress_handler,
};
use state::AppState;

/// Builds the API routes. Cross-cutting layers (CORS, tracing, docs) are added by the binary.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no user required)
    let public_routes = Router::new().route("/health", get(health_handler));

    // Protected routes (x-user-id required)
    let protected_routes = Router::new()
        .route("/books/{book_id}/progress", put(update_progress_handler))
        .route("/stats/streaks", get(streak_stats_handler))
        .route("/activity/minutes", post(record_minutes_handler))
        .layer(axum_middleware::from_fn(require_user));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
