#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::de::DeserializeOwned;
use sportivex::{
    AppConfig, AppState, MockStorageService, create_router,
    auth::Claims,
    config::Env,
    models::{
        AdminDashboardStats, Booking, BookingStatus, CreateBookingRequest, Role, User,
        peak_occupancy,
    },
    repository::{BookingOutcome, CheckInOutcome, Repository},
};
use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

// --- In-memory repository ---

#[derive(Default)]
pub struct MemoryState {
    pub users: Vec<User>,
    pub bookings: Vec<Booking>,
}

/// Repository backed by vectors behind a mutex. Mirrors the Postgres rules
/// for capacity, ownership and check-in.
#[derive(Default, Clone)]
pub struct MemoryRepo {
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepo {
    pub fn with_users(users: Vec<User>) -> Self {
        let repo = Self::default();
        repo.state.lock().unwrap().users = users;
        repo
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.state.lock().unwrap().bookings.clone()
    }
}

#[async_trait]
impl Repository for MemoryRepo {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.state.lock().unwrap().users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, sqlx::Error> {
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn create_user(&self, user: User) -> Result<User, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        state.users.retain(|u| u.id != user.id);
        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = full_name {
            user.full_name = name;
        }
        if avatar_url.is_some() {
            user.avatar_url = avatar_url;
        }
        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        Ok(state.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.role = role;
            u.clone()
        }))
    }

    async fn create_booking(
        &self,
        user_id: Uuid,
        req: &CreateBookingRequest,
    ) -> Result<BookingOutcome, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let overlapping: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| {
                b.facility == req.facility && b.is_active() && b.overlaps(req.slot_start, req.slot_end)
            })
            .cloned()
            .collect();

        if overlapping.iter().any(|b| b.user_id == user_id) {
            return Ok(BookingOutcome::AlreadyBooked);
        }
        if peak_occupancy(&overlapping, req.slot_start, req.slot_end) as i64
            >= req.facility.capacity()
        {
            return Ok(BookingOutcome::FacilityFull);
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id,
            facility: req.facility,
            slot_start: req.slot_start,
            slot_end: req.slot_end,
            status: BookingStatus::Booked,
            qr_token: Uuid::new_v4(),
            created_at: Utc::now(),
            checked_in_at: None,
        };
        state.bookings.push(booking.clone());
        Ok(BookingOutcome::Created(booking))
    }

    async fn get_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, sqlx::Error> {
        let mut bookings: Vec<Booking> = self
            .state
            .lock()
            .unwrap()
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.slot_start.cmp(&a.slot_start));
        Ok(bookings)
    }

    async fn get_all_bookings(&self) -> Result<Vec<Booking>, sqlx::Error> {
        Ok(self.state.lock().unwrap().bookings.clone())
    }

    async fn cancel_booking(&self, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        match state
            .bookings
            .iter_mut()
            .find(|b| b.id == id && b.user_id == user_id && b.status == BookingStatus::Booked)
        {
            Some(booking) => {
                booking.status = BookingStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn check_in(&self, qr_token: Uuid) -> Result<CheckInOutcome, sqlx::Error> {
        let mut state = self.state.lock().unwrap();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.qr_token == qr_token) else {
            return Ok(CheckInOutcome::NotFound);
        };
        Ok(match booking.status {
            BookingStatus::CheckedIn => CheckInOutcome::AlreadyCheckedIn,
            BookingStatus::Cancelled => CheckInOutcome::Cancelled,
            BookingStatus::Booked => {
                booking.status = BookingStatus::CheckedIn;
                booking.checked_in_at = Some(Utc::now());
                CheckInOutcome::CheckedIn(booking.clone())
            }
        })
    }

    async fn get_stats(&self) -> Result<AdminDashboardStats, sqlx::Error> {
        let state = self.state.lock().unwrap();
        Ok(AdminDashboardStats {
            total_users: state.users.len() as i64,
            total_bookings: state.bookings.len() as i64,
            active_bookings: state
                .bookings
                .iter()
                .filter(|b| b.status == BookingStatus::Booked)
                .count() as i64,
            checked_in_today: state
                .bookings
                .iter()
                .filter(|b| b.status == BookingStatus::CheckedIn)
                .count() as i64,
        })
    }
}

// --- Fixtures ---

pub fn user(role: Role) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        email: format!("{}@sportivex.test", id.simple()),
        full_name: "Test Member".to_string(),
        role,
        avatar_url: None,
    }
}

pub fn config(env: Env) -> AppConfig {
    AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn state(repo: MemoryRepo, storage: MockStorageService, env: Env) -> AppState {
    AppState {
        repo: Arc::new(repo),
        storage: Arc::new(storage),
        config: config(env),
    }
}

pub fn app(repo: MemoryRepo) -> Router {
    create_router(state(repo, MockStorageService::new(), Env::Production))
}

/// Signs an HS256 token expiring `exp_offset_secs` from now (negative = already expired).
pub fn token_for(user_id: Uuid, exp_offset_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

// --- Request helpers ---

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer_for: Option<Uuid>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = bearer_for {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id, 3600)));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn json_body<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
