mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{MemoryRepo, app, assert_status, json_body, send, user};
use serde_json::json;
use sportivex::{
    error::ErrorBody,
    models::{
        AdminDashboardStats, Booking, BookingStatus, Facility, FacilityInfo, Role, User,
        UserProfile,
    },
};
use uuid::Uuid;

fn slot_json(facility: &str, hours_ahead: i64) -> serde_json::Value {
    let start = Utc::now() + Duration::hours(hours_ahead);
    json!({
        "facility": facility,
        "slot_start": start,
        "slot_end": start + Duration::hours(1),
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = app(MemoryRepo::default());
    let response = send(&app, "GET", "/health", None, None).await;
    assert_status(&response, StatusCode::OK);
}

#[tokio::test]
async fn test_facilities_are_public() {
    let app = app(MemoryRepo::default());
    let response = send(&app, "GET", "/facilities", None, None).await;
    assert_status(&response, StatusCode::OK);

    let facilities: Vec<FacilityInfo> = json_body(response).await;
    assert_eq!(facilities.len(), Facility::ALL.len());
    let badminton = facilities
        .iter()
        .find(|f| f.facility == Facility::Badminton)
        .unwrap();
    assert_eq!(badminton.capacity, 4);
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = app(MemoryRepo::default());
    let response = send(&app, "GET", "/me", None, None).await;
    assert_status(&response, StatusCode::UNAUTHORIZED);

    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.error, "unauthorized");
}

#[tokio::test]
async fn test_me_returns_profile_with_display_role() {
    let member = user(Role::PgStudent);
    let app = app(MemoryRepo::with_users(vec![member.clone()]));

    let response = send(&app, "GET", "/me", Some(member.id), None).await;
    assert_status(&response, StatusCode::OK);

    let raw: serde_json::Value = json_body(response).await;
    assert_eq!(raw["role"], "PG Student");
    let profile: UserProfile = serde_json::from_value(raw).unwrap();
    assert_eq!(profile.id, member.id);
}

#[tokio::test]
async fn test_update_me_sets_name_and_avatar() {
    let member = user(Role::Alumni);
    let app = app(MemoryRepo::with_users(vec![member.clone()]));
    let key = format!("avatars/{}/face.png", member.id);

    let response = send(
        &app,
        "PUT",
        "/me",
        Some(member.id),
        Some(json!({ "full_name": "  Ada Lovelace ", "avatar_key": key })),
    )
    .await;
    assert_status(&response, StatusCode::OK);

    let profile: UserProfile = json_body(response).await;
    assert_eq!(profile.full_name, "Ada Lovelace");
    assert!(profile.avatar_url.unwrap().ends_with(&key));
}

#[tokio::test]
async fn test_update_me_rejects_foreign_avatar_key() {
    let member = user(Role::Alumni);
    let app = app(MemoryRepo::with_users(vec![member.clone()]));

    let response = send(
        &app,
        "PUT",
        "/me",
        Some(member.id),
        Some(json!({ "avatar_key": format!("avatars/{}/x.png", Uuid::new_v4()) })),
    )
    .await;
    assert_status(&response, StatusCode::FORBIDDEN);

    // Climbing out of the caller's own prefix is refused too.
    let escaped = format!("avatars/{}/../{}/x.png", member.id, Uuid::new_v4());
    let response = send(&app, "PUT", "/me", Some(member.id), Some(json!({ "avatar_key": escaped }))).await;
    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_student_cannot_reach_admin_routes() {
    let student = user(Role::UgStudent);
    let app = app(MemoryRepo::with_users(vec![student.clone()]));

    for uri in ["/admin/stats", "/admin/bookings", "/admin/users"] {
        let response = send(&app, "GET", uri, Some(student.id), None).await;
        assert_status(&response, StatusCode::FORBIDDEN);
    }

    let anonymous = send(&app, "GET", "/admin/stats", None, None).await;
    assert_status(&anonymous, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_lifecycle_with_check_in() {
    let member = user(Role::UgStudent);
    let admin = user(Role::Admin);
    let repo = MemoryRepo::with_users(vec![member.clone(), admin.clone()]);
    let app = app(repo.clone());

    let response = send(&app, "POST", "/bookings", Some(member.id), Some(slot_json("gym", 2))).await;
    assert_status(&response, StatusCode::CREATED);
    let booking: Booking = json_body(response).await;
    assert_eq!(booking.status, BookingStatus::Booked);
    assert_eq!(booking.user_id, member.id);

    let response = send(&app, "GET", "/me/bookings", Some(member.id), None).await;
    let mine: Vec<Booking> = json_body(response).await;
    assert_eq!(mine.len(), 1);

    let scan = json!({ "qr_token": booking.qr_token });
    let response = send(&app, "POST", "/admin/checkins", Some(admin.id), Some(scan.clone())).await;
    assert_status(&response, StatusCode::OK);
    let checked: Booking = json_body(response).await;
    assert_eq!(checked.status, BookingStatus::CheckedIn);
    assert!(checked.checked_in_at.is_some());

    // Second scan of the same code.
    let response = send(&app, "POST", "/admin/checkins", Some(admin.id), Some(scan)).await;
    assert_status(&response, StatusCode::CONFLICT);

    // Checked-in bookings cannot be cancelled.
    let response = send(
        &app,
        "DELETE",
        &format!("/bookings/{}", booking.id),
        Some(member.id),
        None,
    )
    .await;
    assert_status(&response, StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/admin/stats", Some(admin.id), None).await;
    let stats: AdminDashboardStats = json_body(response).await;
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_bookings, 1);
    assert_eq!(stats.checked_in_today, 1);
}

#[tokio::test]
async fn test_unknown_qr_token_is_not_found() {
    let admin = user(Role::Admin);
    let app = app(MemoryRepo::with_users(vec![admin.clone()]));

    let response = send(
        &app,
        "POST",
        "/admin/checkins",
        Some(admin.id),
        Some(json!({ "qr_token": Uuid::new_v4() })),
    )
    .await;
    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancelled_booking_cannot_check_in() {
    let member = user(Role::Faculty);
    let admin = user(Role::Admin);
    let app = app(MemoryRepo::with_users(vec![member.clone(), admin.clone()]));

    let response = send(&app, "POST", "/bookings", Some(member.id), Some(slot_json("swimming", 5))).await;
    let booking: Booking = json_body(response).await;

    let response = send(
        &app,
        "DELETE",
        &format!("/bookings/{}", booking.id),
        Some(member.id),
        None,
    )
    .await;
    assert_status(&response, StatusCode::NO_CONTENT);

    let response = send(
        &app,
        "POST",
        "/admin/checkins",
        Some(admin.id),
        Some(json!({ "qr_token": booking.qr_token })),
    )
    .await;
    assert_status(&response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_facility_capacity_is_enforced() {
    let members: Vec<User> = (0..5).map(|_| user(Role::UgStudent)).collect();
    let app = app(MemoryRepo::with_users(members.clone()));
    let slot = slot_json("badminton", 3);

    for member in &members[..4] {
        let response = send(&app, "POST", "/bookings", Some(member.id), Some(slot.clone())).await;
        assert_status(&response, StatusCode::CREATED);
    }

    let response = send(&app, "POST", "/bookings", Some(members[4].id), Some(slot)).await;
    assert_status(&response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_capacity_uses_peak_concurrent_occupancy() {
    let members: Vec<User> = (0..6).map(|_| user(Role::UgStudent)).collect();
    let app = app(MemoryRepo::with_users(members.clone()));
    let base = Utc::now() + Duration::hours(5);
    let window = |from: i64, to: i64| {
        json!({
            "facility": "badminton",
            "slot_start": base + Duration::hours(from),
            "slot_end": base + Duration::hours(to),
        })
    };

    // Two courts taken in each of two back-to-back hours.
    for (member, slot) in members[..4]
        .iter()
        .zip([window(0, 1), window(0, 1), window(1, 2), window(1, 2)])
    {
        let response = send(&app, "POST", "/bookings", Some(member.id), Some(slot)).await;
        assert_status(&response, StatusCode::CREATED);
    }

    // Four bookings overlap the two hours, but never more than two at once.
    let response = send(&app, "POST", "/bookings", Some(members[4].id), Some(window(0, 2))).await;
    assert_status(&response, StatusCode::CREATED);
    let response = send(&app, "POST", "/bookings", Some(members[5].id), Some(window(0, 2))).await;
    assert_status(&response, StatusCode::CREATED);

    // The second hour now holds four.
    let response = send(&app, "POST", "/bookings", Some(members[0].id), Some(window(1, 2))).await;
    assert_status(&response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_double_booking_same_slot_is_rejected() {
    let member = user(Role::UgStudent);
    let app = app(MemoryRepo::with_users(vec![member.clone()]));
    let slot = slot_json("horse_riding", 4);

    let first = send(&app, "POST", "/bookings", Some(member.id), Some(slot.clone())).await;
    assert_status(&first, StatusCode::CREATED);
    let second = send(&app, "POST", "/bookings", Some(member.id), Some(slot)).await;
    assert_status(&second, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_slot_is_rejected() {
    let member = user(Role::UgStudent);
    let app = app(MemoryRepo::with_users(vec![member.clone()]));
    let start = Utc::now() + Duration::hours(1);

    let response = send(
        &app,
        "POST",
        "/bookings",
        Some(member.id),
        Some(json!({ "facility": "gym", "slot_start": start, "slot_end": start - Duration::minutes(5) })),
    )
    .await;
    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_updates_role_with_normalization() {
    let admin = user(Role::Admin);
    let member = user(Role::UgStudent);
    let app = app(MemoryRepo::with_users(vec![admin.clone(), member.clone()]));

    let uri = format!("/admin/users/{}/role", member.id);
    let response = send(&app, "PUT", &uri, Some(admin.id), Some(json!({ "role": " faculty " }))).await;
    assert_status(&response, StatusCode::OK);
    let updated: User = json_body(response).await;
    assert_eq!(updated.role, Role::Faculty);

    let response = send(&app, "PUT", &uri, Some(admin.id), Some(json!({ "role": "Admin1" }))).await;
    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(
        &app,
        "PUT",
        &format!("/admin/users/{}/role", Uuid::new_v4()),
        Some(admin.id),
        Some(json!({ "role": "alumni" })),
    )
    .await;
    assert_status(&response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_refuses_admin_role() {
    let app = app(MemoryRepo::default());
    let response = send(
        &app,
        "POST",
        "/register",
        None,
        Some(json!({
            "email": "new@sportivex.test",
            "password": "long-enough",
            "full_name": "New Member",
            "role": "ADMIN"
        })),
    )
    .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_allows_only_configured_origins() {
    let app = app(MemoryRepo::default());

    let request = |origin: &'static str| {
        axum::http::Request::builder()
            .uri("/health")
            .header("origin", origin)
            .body(axum::body::Body::empty())
            .unwrap()
    };

    use tower::util::ServiceExt;
    let allowed = app.clone().oneshot(request("http://localhost:5173")).await.unwrap();
    assert_eq!(
        allowed.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:5173"
    );

    let denied = app.oneshot(request("http://evil.test")).await.unwrap();
    assert!(denied.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = app(MemoryRepo::default());
    let response = send(&app, "GET", "/health", None, None).await;
    assert!(response.headers().contains_key("x-request-id"));
}
