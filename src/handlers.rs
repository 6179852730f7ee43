use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    storage,
    models::{
        AdminDashboardStats, Booking, CheckInRequest, CreateBookingRequest, Facility,
        FacilityInfo, PresignedUrlRequest, PresignedUrlResponse, RegisterUserRequest, Role,
        UpdateProfileRequest, UpdateRoleRequest, User, UserProfile,
    },
    repository::{BookingOutcome, CheckInOutcome},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Longest slot a single booking may cover.
pub const MAX_BOOKING_HOURS: i64 = 3;

/// Minimal view of the Supabase `/auth/v1/signup` response.
#[derive(Deserialize)]
struct SupabaseAuthResponse {
    id: Uuid,
}

// --- Public ---

/// list_facilities
///
/// [Public Route] Facilities and their per-slot capacity.
#[utoipa::path(
    get,
    path = "/facilities",
    responses((status = 200, description = "Bookable facilities", body = [FacilityInfo]))
)]
pub async fn list_facilities() -> Json<Vec<FacilityInfo>> {
    Json(Facility::ALL.into_iter().map(FacilityInfo::from).collect())
}

/// register_user
///
/// [Public Route] Creates the Supabase auth user, then mirrors it into `profiles`
/// under the same id. The admin role cannot be self-assigned.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = User),
        (status = 400, description = "Rejected by the auth provider or invalid role"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> ApiResult<Json<User>> {
    let role: Role = payload
        .role
        .parse()
        .map_err(|e: crate::models::UnknownRole| ApiError::BadRequest(e.to_string()))?;
    if role.is_admin() {
        return Err(ApiError::BadRequest("admin role cannot be self-assigned".to_string()));
    }
    validate_email(&payload.email)?;
    if payload.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::Validation("full_name is required".to_string()));
    }

    let (Some(supabase_url), Some(supabase_key)) =
        (&state.config.supabase_url, &state.config.supabase_key)
    else {
        return Err(ApiError::Internal("Supabase signup is not configured".to_string()));
    };

    let response = reqwest::Client::new()
        .post(format!("{}/auth/v1/signup", supabase_url))
        .header("apikey", supabase_key)
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    if !response.status().is_success() {
        tracing::info!(status = %response.status(), "signup rejected by auth provider");
        return Err(ApiError::BadRequest("signup rejected".to_string()));
    }

    let supabase_user = response
        .json::<SupabaseAuthResponse>()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let created = state
        .repo
        .create_user(User {
            id: supabase_user.id,
            email: payload.email,
            full_name: full_name.to_string(),
            role,
            avatar_url: None,
        })
        .await?;

    tracing::info!(user_id = %created.id, role = %created.role, "user registered");
    Ok(Json(created))
}

// --- Authenticated ---

/// get_me
///
/// [Authenticated Route] Profile of the caller. This is the endpoint the
/// frontend admin guard fetches to decide access.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<UserProfile>> {
    let user = state.repo.get_user(id).await?.ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Partial profile update. `avatar_key` is an object key
/// from the presigned upload flow and must live under the caller's prefix.
#[utoipa::path(
    put,
    path = "/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated profile", body = UserProfile))
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let full_name = match payload.full_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::Validation("full_name cannot be blank".to_string()));
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };

    let avatar_url = match payload.avatar_key {
        Some(key) => {
            if !storage::is_avatar_key_of(id, &key) {
                return Err(ApiError::Forbidden("avatar key outside user prefix".to_string()));
            }
            Some(state.storage.object_url(&key))
        }
        None => None,
    };

    let user = state
        .repo
        .update_profile(id, full_name, avatar_url)
        .await?
        .ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(user.into()))
}

/// get_presigned_url
///
/// [Authenticated Route] Short-lived upload URL for an avatar image, keyed
/// `avatars/{user_id}/{uuid}.{ext}`.
#[utoipa::path(
    post,
    path = "/upload/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 422, description = "Not an image")
    )
)]
pub async fn get_presigned_url(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> ApiResult<Json<PresignedUrlResponse>> {
    if !payload.file_type.starts_with("image/") {
        return Err(ApiError::Validation("only image uploads are accepted".to_string()));
    }

    let object_key = storage::avatar_key(id, &payload.filename);

    let upload_url = state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await
        .map_err(ApiError::Storage)?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

/// create_booking
///
/// [Authenticated Route] Books a facility slot. The returned `qr_token` is
/// what the member's QR code encodes for check-in.
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booked", body = Booking),
        (status = 409, description = "Facility full or overlapping booking"),
        (status = 422, description = "Invalid slot")
    )
)]
pub async fn create_booking(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    validate_slot(&payload)?;

    match state.repo.create_booking(id, &payload).await? {
        BookingOutcome::Created(booking) => {
            tracing::info!(
                booking_id = %booking.id,
                facility = booking.facility.as_str(),
                "booking created"
            );
            Ok((StatusCode::CREATED, Json(booking)))
        }
        BookingOutcome::FacilityFull => Err(ApiError::Conflict(format!(
            "{} is fully booked for this slot",
            payload.facility.display_name()
        ))),
        BookingOutcome::AlreadyBooked => Err(ApiError::Conflict(
            "you already have a booking overlapping this slot".to_string(),
        )),
    }
}

/// get_my_bookings
///
/// [Authenticated Route] The caller's bookings, latest slot first.
#[utoipa::path(
    get,
    path = "/me/bookings",
    responses((status = 200, description = "My bookings", body = [Booking]))
)]
pub async fn get_my_bookings(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Booking>>> {
    Ok(Json(state.repo.get_user_bookings(id).await?))
}

/// cancel_booking
///
/// [Authenticated Route] Cancels one of the caller's own bookings that has not
/// been checked in yet.
#[utoipa::path(
    delete,
    path = "/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 404, description = "No cancellable booking with this id")
    )
)]
pub async fn cancel_booking(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.repo.cancel_booking(id, user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("booking"))
    }
}

// --- Admin ---

/// get_admin_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Stats", body = AdminDashboardStats),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_admin_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<AdminDashboardStats>> {
    user.require_admin()?;
    Ok(Json(state.repo.get_stats().await?))
}

/// get_admin_bookings
///
/// [Admin Route] Every booking in the system.
#[utoipa::path(
    get,
    path = "/admin/bookings",
    responses((status = 200, description = "All bookings", body = [Booking]))
)]
pub async fn get_admin_bookings(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Booking>>> {
    user.require_admin()?;
    Ok(Json(state.repo.get_all_bookings().await?))
}

/// check_in
///
/// [Admin Route] Marks the booking behind a scanned QR code as checked in.
#[utoipa::path(
    post,
    path = "/admin/checkins",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in", body = Booking),
        (status = 404, description = "Unknown QR code"),
        (status = 409, description = "Already checked in or cancelled")
    )
)]
pub async fn check_in(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CheckInRequest>,
) -> ApiResult<Json<Booking>> {
    user.require_admin()?;

    match state.repo.check_in(payload.qr_token).await? {
        CheckInOutcome::CheckedIn(booking) => {
            tracing::info!(booking_id = %booking.id, admin_id = %user.id, "booking checked in");
            Ok(Json(booking))
        }
        CheckInOutcome::NotFound => Err(ApiError::NotFound("booking")),
        CheckInOutcome::AlreadyCheckedIn => {
            Err(ApiError::Conflict("booking already checked in".to_string()))
        }
        CheckInOutcome::Cancelled => Err(ApiError::Conflict("booking was cancelled".to_string())),
    }
}

/// get_admin_users
///
/// [Admin Route] All profiles.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = [User]))
)]
pub async fn get_admin_users(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<User>>> {
    user.require_admin()?;
    Ok(Json(state.repo.list_users().await?))
}

/// update_user_role
///
/// [Admin Route] Changes a user's role. The raw value is normalized like any
/// other role string.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "No such user"),
        (status = 422, description = "Unknown role")
    )
)]
pub async fn update_user_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(target): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<User>> {
    user.require_admin()?;
    let role: Role = payload
        .role
        .parse()
        .map_err(|e: crate::models::UnknownRole| ApiError::Validation(e.to_string()))?;

    let updated = state
        .repo
        .set_role(target, role)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    tracing::info!(admin_id = %user.id, user_id = %target, role = %role, "role updated");
    Ok(Json(updated))
}

// --- Validation helpers ---

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation("invalid email address".to_string()))
    }
}

/// Slots must be in the future, non-empty, and at most `MAX_BOOKING_HOURS` long.
pub fn validate_slot(req: &CreateBookingRequest) -> ApiResult<()> {
    if req.slot_end <= req.slot_start {
        return Err(ApiError::Validation("slot_end must be after slot_start".to_string()));
    }
    if req.slot_end - req.slot_start > Duration::hours(MAX_BOOKING_HOURS) {
        return Err(ApiError::Validation(format!(
            "slots are limited to {MAX_BOOKING_HOURS} hours"
        )));
    }
    if req.slot_start < Utc::now() {
        return Err(ApiError::Validation("slot_start is in the past".to_string()));
    }
    Ok(())
}
