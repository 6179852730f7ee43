use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Roles ---

/// Role
///
/// The closed set of account roles. Raw role strings coming from the database,
/// the admin panel or the profile endpoint are parsed once at the boundary;
/// everything past that point compares enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    #[default]
    UgStudent,
    PgStudent,
    Alumni,
    Faculty,
    Admin,
}

/// Returned when a raw role string does not name a known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 5] = [
        Role::UgStudent,
        Role::PgStudent,
        Role::Alumni,
        Role::Faculty,
        Role::Admin,
    ];

    /// Display form, also the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::UgStudent => "UG Student",
            Role::PgStudent => "PG Student",
            Role::Alumni => "Alumni",
            Role::Faculty => "Faculty",
            Role::Admin => "Admin",
        }
    }

    /// Parses an optional raw role. `None`, blank and unknown strings yield `None`.
    pub fn from_raw(raw: Option<&str>) -> Option<Role> {
        raw.and_then(|r| r.parse().ok())
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Case-insensitive, ignores surrounding whitespace. Only the exact word
    /// `admin` maps to `Role::Admin`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "admin" => Ok(Role::Admin),
            "faculty" => Ok(Role::Faculty),
            "alumni" => Ok(Role::Alumni),
            "ug student" | "ug_student" | "ug-student" => Ok(Role::UgStudent),
            "pg student" | "pg_student" | "pg-student" => Ok(Role::PgStudent),
            _ => Err(UnknownRole(raw.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// --- Facilities & Bookings ---

/// Facility
///
/// Bookable facilities. Each has a fixed number of places per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    Swimming,
    Badminton,
    Gym,
    HorseRiding,
    League,
}

impl Facility {
    pub const ALL: [Facility; 5] = [
        Facility::Swimming,
        Facility::Badminton,
        Facility::Gym,
        Facility::HorseRiding,
        Facility::League,
    ];

    /// Concurrent places available in one slot.
    pub fn capacity(&self) -> i64 {
        match self {
            Facility::Swimming => 30,
            Facility::Badminton => 4,
            Facility::Gym => 40,
            Facility::HorseRiding => 6,
            Facility::League => 22,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Facility::Swimming => "Swimming Pool",
            Facility::Badminton => "Badminton Courts",
            Facility::Gym => "Gym",
            Facility::HorseRiding => "Horse Riding",
            Facility::League => "League Matches",
        }
    }

    /// Column value used in the `bookings.facility` text column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Facility::Swimming => "swimming",
            Facility::Badminton => "badminton",
            Facility::Gym => "gym",
            Facility::HorseRiding => "horse_riding",
            Facility::League => "league",
        }
    }
}

impl FromStr for Facility {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Facility::ALL
            .into_iter()
            .find(|f| f.as_str() == raw)
            .ok_or_else(|| format!("unknown facility: {raw}"))
    }
}

/// BookingStatus
///
/// Lifecycle: `Booked` → `CheckedIn` on QR scan, or `Booked` → `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Booked,
    CheckedIn,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "booked" => Ok(BookingStatus::Booked),
            "checked_in" => Ok(BookingStatus::CheckedIn),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

// --- Core Application Schemas ---

/// User
///
/// Canonical identity record from `profiles`, with the role already parsed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "UG Student")]
    pub role: Role,
    pub avatar_url: Option<String>,
}

/// Booking
///
/// One reservation of a facility slot. `qr_token` is what the check-in QR code encodes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    #[ts(type = "string")]
    pub facility: Facility,
    #[ts(type = "string")]
    pub slot_start: DateTime<Utc>,
    #[ts(type = "string")]
    pub slot_end: DateTime<Utc>,
    #[ts(type = "string")]
    pub status: BookingStatus,
    pub qr_token: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Half-open interval overlap: `[a, b)` and `[c, d)` overlap iff `a < d && c < b`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.slot_start < end && start < self.slot_end
    }

    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

/// Highest number of active `bookings` held at any single instant of
/// `[start, end)`. Occupancy only rises at a booking's start, so the peak is at
/// `start` or at a booking start inside the window.
pub fn peak_occupancy(bookings: &[Booking], start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
    let active: Vec<&Booking> = bookings
        .iter()
        .filter(|b| b.is_active() && b.overlaps(start, end))
        .collect();

    std::iter::once(start)
        .chain(active.iter().map(|b| b.slot_start).filter(|&at| at > start))
        .map(|at| {
            active
                .iter()
                .filter(|b| b.slot_start <= at && at < b.slot_end)
                .count()
        })
        .max()
        .unwrap_or(0)
}

// --- Request Payloads ---

/// RegisterUserRequest
///
/// Public signup payload. The password is forwarded to Supabase and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    /// Raw role string; parsed and checked by the handler.
    pub role: String,
}

/// UpdateProfileRequest
///
/// Partial update for `PUT /me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Object key returned by the presigned upload flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_key: Option<String>,
}

/// CreateBookingRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateBookingRequest {
    #[ts(type = "string")]
    pub facility: Facility,
    #[ts(type = "string")]
    pub slot_start: DateTime<Utc>,
    #[ts(type = "string")]
    pub slot_end: DateTime<Utc>,
}

/// CheckInRequest
///
/// Payload posted by the admin scanner after decoding a booking QR code.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CheckInRequest {
    pub qr_token: Uuid,
}

/// UpdateRoleRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// PresignedUrlRequest
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// Original filename, used for the extension.
    #[schema(example = "avatar.png")]
    pub filename: String,
    /// MIME type the upload is pinned to. Must be `image/*`.
    #[schema(example = "image/png")]
    pub file_type: String,
}

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    pub resource_key: String,
}

// --- Output Schemas ---

/// UserProfile
///
/// Response of `GET /me`, the endpoint the client-side admin guard fetches.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "Faculty")]
    pub role: Role,
    pub avatar_url: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            avatar_url: user.avatar_url,
        }
    }
}

/// FacilityInfo
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FacilityInfo {
    #[ts(type = "string")]
    pub facility: Facility,
    pub display_name: String,
    pub capacity: i64,
}

impl From<Facility> for FacilityInfo {
    fn from(facility: Facility) -> Self {
        Self {
            facility,
            display_name: facility.display_name().to_string(),
            capacity: facility.capacity(),
        }
    }
}

/// AdminDashboardStats
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub total_bookings: i64,
    /// Bookings still in the `booked` state.
    pub active_bookings: i64,
    pub checked_in_today: i64,
}
