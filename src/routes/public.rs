use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints open to anonymous clients.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Supabase signup plus the mirrored profile row.
        .route("/register", post(handlers::register_user))
        // GET /facilities
        .route("/facilities", get(handlers::list_facilities))
}
