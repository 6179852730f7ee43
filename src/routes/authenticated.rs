use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Member features. Mounted behind `auth_middleware`, which resolves the
/// `AuthUser` once and stores it in the request extensions.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /me
        // The profile endpoint consumed by the frontend guards.
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        // GET /me/bookings
        .route("/me/bookings", get(handlers::get_my_bookings))
        // POST /upload/presigned
        // Avatar upload URL, valid for ten minutes.
        .route("/upload/presigned", post(handlers::get_presigned_url))
        // POST /bookings
        .route("/bookings", post(handlers::create_booking))
        // DELETE /bookings/{id}
        // Owner-only cancellation.
        .route("/bookings/{id}", delete(handlers::cancel_booking))
}
