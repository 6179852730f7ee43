use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;

// Client-side session gating: token store, profile fetcher and route guards.
pub mod guard;

// Routers split by access tier (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every annotated handler, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_facilities, handlers::register_user, handlers::get_me,
        handlers::update_me, handlers::get_presigned_url, handlers::create_booking,
        handlers::get_my_bookings, handlers::cancel_booking, handlers::get_admin_stats,
        handlers::get_admin_bookings, handlers::check_in, handlers::get_admin_users,
        handlers::update_user_role
    ),
    components(
        schemas(
            models::User, models::UserProfile, models::Booking, models::BookingStatus,
            models::Facility, models::FacilityInfo, models::RegisterUserRequest,
            models::UpdateProfileRequest, models::CreateBookingRequest, models::CheckInRequest,
            models::UpdateRoleRequest, models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::AdminDashboardStats, error::ErrorBody,
        )
    ),
    tags(
        (name = "sportivex", description = "SportiveX facility booking API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cheaply clonable container for every service a handler needs. One
/// instance is built in `main` (or per test) and cloned into each request.
#[derive(Clone)]
pub struct AppState {
    /// Profiles and bookings.
    pub repo: RepositoryState,
    /// Avatar uploads.
    pub storage: StorageState,
    /// Loaded once at startup, never mutated.
    pub config: AppConfig,
}

// --- FromRef Extractors ---

// Lets handlers and extractors pull a single component out of `AppState`.
impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Resolves the `AuthUser` (401 on failure) and caches it in the request
/// extensions so handlers do not hit the database a second time.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// admin_middleware
///
/// `auth_middleware` plus the admin role check (403 for any other role).
async fn admin_middleware(
    auth_user: AuthUser,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = auth_user.require_admin() {
        tracing::info!(user_id = %auth_user.id, role = %auth_user.role, "admin route denied");
        return Err(e);
    }
    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// cors_layer
///
/// Built from the single configured allow-list. Applied outermost, so error
/// responses produced by inner layers carry the same CORS headers.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::DEV_USER_HEADER),
        ])
        .allow_credentials(true)
}

/// create_router
///
/// Assembles the routing tree, the per-tier guards and the observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS from the configured allow-list.
    let cors = cors_layer(&state.config);
    // Correlation header shared by the request-id layers and the trace span.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Routing tree
    let base_router = Router::new()
        // Documentation
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public: no middleware.
        .merge(public::public_routes())
        // Authenticated: any signed-in profile.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin: signed in with the admin role. Handlers check the role again.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    // 3. Observability
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Assign an x-request-id to every request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. One span per request, tagged with the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Echo the request id back on the response.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS outermost, so rejections from inner layers carry the headers too.
        .layer(cors)
}

/// trace_span_logger
///
/// Request span carrying the `x-request-id` so every log line of a request correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
