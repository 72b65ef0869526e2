//! Route definitions.

use axum::{Router, middleware::from_fn, routing::get};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{admin, health, intercept};
use crate::middleware::request_id;
use crate::state::AppState;

/// Management routes under `/_stash`; everything else is intercepted.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/_stash", admin_routes())
        .fallback(intercept::intercept)
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/stats", get(admin::stats))
        .route("/partitions", get(admin::partitions))
        .layer(CorsLayer::permissive())
}
