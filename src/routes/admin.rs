use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Nested under `/admin` and wrapped in `admin_middleware`. Handlers repeat the
/// role check through `AuthUser::require_admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        .route("/stats", get(handlers::get_admin_stats))
        // GET /admin/bookings
        .route("/bookings", get(handlers::get_admin_bookings))
        // POST /admin/checkins
        // Called by the QR scanner at the facility desk.
        .route("/checkins", post(handlers::check_in))
        // GET /admin/users
        .route("/users", get(handlers::get_admin_users))
        // PUT /admin/users/{id}/role
        .route("/users/{id}/role", put(handlers::update_user_role))
}
