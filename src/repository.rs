use crate::models::{
    AdminDashboardStats, Booking, BookingStatus, CreateBookingRequest, Role, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a booking attempt. Capacity and double-booking checks run inside
/// the same transaction as the insert.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Created(Booking),
    /// At some instant of the slot the facility already holds `capacity` active bookings.
    FacilityFull,
    /// The user already holds an active booking overlapping the slot at this facility.
    AlreadyBooked,
}

/// Result of scanning a booking QR code.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    CheckedIn(Booking),
    NotFound,
    AlreadyCheckedIn,
    Cancelled,
}

/// Repository Trait
///
/// Persistence contract used by handlers and the auth extractor. Handlers only
/// see `Arc<dyn Repository>`, so tests swap in in-memory implementations.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn list_users(&self) -> Result<Vec<User>, sqlx::Error>;
    async fn create_user(&self, user: User) -> Result<User, sqlx::Error>;
    // `None` fields are left untouched.
    async fn update_profile(
        &self,
        id: Uuid,
        full_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Option<User>, sqlx::Error>;
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, sqlx::Error>;

    // --- Bookings ---
    async fn create_booking(
        &self,
        user_id: Uuid,
        req: &CreateBookingRequest,
    ) -> Result<BookingOutcome, sqlx::Error>;
    async fn get_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, sqlx::Error>;
    async fn get_all_bookings(&self) -> Result<Vec<Booking>, sqlx::Error>;
    // Owner-only, and only while the booking is still `booked`.
    async fn cancel_booking(&self, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>;
    async fn check_in(&self, qr_token: Uuid) -> Result<CheckInOutcome, sqlx::Error>;

    // --- Admin ---
    async fn get_stats(&self) -> Result<AdminDashboardStats, sqlx::Error>;
}

/// RepositoryState
///
/// Shared handle to the persistence layer.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row mapping ---

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    avatar_url: Option<String>,
}

impl ProfileRow {
    /// Parses the free-text role column. Rows with an unknown role are unusable.
    fn into_user(self) -> Option<User> {
        match self.role.parse::<Role>() {
            Ok(role) => Some(User {
                id: self.id,
                email: self.email,
                full_name: self.full_name,
                role,
                avatar_url: self.avatar_url,
            }),
            Err(e) => {
                tracing::warn!(user_id = %self.id, error = %e, "profile has unusable role");
                None
            }
        }
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    facility: String,
    slot_start: DateTime<Utc>,
    slot_end: DateTime<Utc>,
    status: String,
    qr_token: Uuid,
    created_at: DateTime<Utc>,
    checked_in_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = sqlx::Error;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            facility: row.facility.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            slot_start: row.slot_start,
            slot_end: row.slot_end,
            status: row.status.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            qr_token: row.qr_token,
            created_at: row.created_at,
            checked_in_at: row.checked_in_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, sqlx::Error> {
    rows.into_iter().map(Booking::try_from).collect()
}

const PROFILE_COLUMNS: &str = "id, email, full_name, role, avatar_url";
const BOOKING_COLUMNS: &str =
    "id, user_id, facility, slot_start, slot_end, status, qr_token, created_at, checked_in_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are built at runtime so the crate
/// compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(ProfileRow::into_user))
    }

    async fn list_users(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(ProfileRow::into_user).collect())
    }

    /// create_user
    ///
    /// Mirrors a Supabase auth user into `profiles`. Re-registering the same id
    /// refreshes the email and name but never the role.
    async fn create_user(&self, user: User) -> Result<User, sqlx::Error> {
        let row: ProfileRow = sqlx::query_as(&format!(
            r#"INSERT INTO profiles (id, email, full_name, role, avatar_url)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, full_name = EXCLUDED.full_name
               RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(&user.avatar_url)
        .fetch_one(&self.pool)
        .await?;

        row.into_user()
            .ok_or_else(|| sqlx::Error::Decode("stored profile has unusable role".into()))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Option<User>, sqlx::Error> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            r#"UPDATE profiles
               SET full_name = COALESCE($2, full_name),
                   avatar_url = COALESCE($3, avatar_url)
               WHERE id = $1
               RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(id)
        .bind(full_name)
        .bind(avatar_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(ProfileRow::into_user))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, sqlx::Error> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "UPDATE profiles SET role = $2 WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(ProfileRow::into_user))
    }

    /// create_booking
    ///
    /// Serializes bookings per facility with a transaction-scoped advisory lock,
    /// then checks the user's own overlap and the peak concurrent occupancy of
    /// the slot before inserting.
    async fn create_booking(
        &self,
        user_id: Uuid,
        req: &CreateBookingRequest,
    ) -> Result<BookingOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(req.facility.as_str())
            .execute(&mut *tx)
            .await?;

        // Same rule as `models::peak_occupancy`.
        let (own_overlaps, peak_occupancy): (i64, i64) = sqlx::query_as(
            r#"WITH overlapping AS (
                   SELECT user_id, slot_start, slot_end
                   FROM bookings
                   WHERE facility = $1
                     AND status <> 'cancelled'
                     AND slot_start < $3
                     AND $2 < slot_end
               ),
               points AS (
                   SELECT $2::timestamptz AS at
                   UNION
                   SELECT slot_start FROM overlapping WHERE slot_start > $2
               )
               SELECT
                   (SELECT COUNT(*) FROM overlapping WHERE user_id = $4),
                   (SELECT COALESCE(MAX(held), 0) FROM (
                       SELECT COUNT(o.user_id) AS held
                       FROM points p
                       LEFT JOIN overlapping o ON o.slot_start <= p.at AND p.at < o.slot_end
                       GROUP BY p.at
                   ) per_point)"#,
        )
        .bind(req.facility.as_str())
        .bind(req.slot_start)
        .bind(req.slot_end)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if own_overlaps > 0 {
            return Ok(BookingOutcome::AlreadyBooked);
        }
        if peak_occupancy >= req.facility.capacity() {
            return Ok(BookingOutcome::FacilityFull);
        }

        let row: BookingRow = sqlx::query_as(&format!(
            r#"INSERT INTO bookings (id, user_id, facility, slot_start, slot_end, status, qr_token)
               VALUES ($1, $2, $3, $4, $5, 'booked', $6)
               RETURNING {BOOKING_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.facility.as_str())
        .bind(req.slot_start)
        .bind(req.slot_end)
        .bind(Uuid::new_v4())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(BookingOutcome::Created(row.try_into()?))
    }

    async fn get_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, sqlx::Error> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY slot_start DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }

    async fn get_all_bookings(&self) -> Result<Vec<Booking>, sqlx::Error> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY slot_start DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        into_bookings(rows)
    }

    async fn cancel_booking(&self, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'cancelled' WHERE id = $1 AND user_id = $2 AND status = 'booked'",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// check_in
    ///
    /// Locks the booking row so two scanners cannot both check the same code in.
    async fn check_in(&self, qr_token: Uuid) -> Result<CheckInOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let current: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE qr_token = $1 FOR UPDATE"
        ))
        .bind(qr_token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(CheckInOutcome::NotFound);
        };
        let booking = Booking::try_from(current)?;
        match booking.status {
            BookingStatus::CheckedIn => return Ok(CheckInOutcome::AlreadyCheckedIn),
            BookingStatus::Cancelled => return Ok(CheckInOutcome::Cancelled),
            BookingStatus::Booked => {}
        }

        let row: BookingRow = sqlx::query_as(&format!(
            r#"UPDATE bookings SET status = 'checked_in', checked_in_at = NOW()
               WHERE id = $1
               RETURNING {BOOKING_COLUMNS}"#
        ))
        .bind(booking.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CheckInOutcome::CheckedIn(row.try_into()?))
    }

    async fn get_stats(&self) -> Result<AdminDashboardStats, sqlx::Error> {
        let (total_users, total_bookings, active_bookings, checked_in_today): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"SELECT
                       (SELECT COUNT(*) FROM profiles),
                       (SELECT COUNT(*) FROM bookings),
                       (SELECT COUNT(*) FROM bookings WHERE status = 'booked'),
                       (SELECT COUNT(*) FROM bookings
                          WHERE status = 'checked_in' AND checked_in_at >= date_trunc('day', NOW()))"#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(AdminDashboardStats {
            total_users,
            total_bookings,
            active_bookings,
            checked_in_today,
        })
    }
}
