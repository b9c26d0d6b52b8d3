use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatline_core::{
    Booking, BookingId, BookingStatus, BookingStore, EventId, NewBooking, StoreError, StoreResult,
};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::map_sqlx_error;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    event_id: i64,
    user_id: String,
    status: String,
    waitlist_order: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {}", row.id, e)))?;

        Ok(Booking {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            status,
            waitlist_order: row.waitlist_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, event_id, user_id, status, waitlist_order, created_at, updated_at";

fn into_booking(row: Option<BookingRow>) -> StoreResult<Option<Booking>> {
    row.map(Booking::try_from).transpose()
}

#[async_trait]
impl BookingStore<Transaction<'static, Postgres>> for PgBookingStore {
    async fn insert(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        booking: NewBooking,
    ) -> StoreResult<Booking> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (event_id, user_id, status, waitlist_order, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking.event_id)
        .bind(&booking.user_id)
        .bind(booking.status.as_str())
        .bind(booking.waitlist_order)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Booking::try_from(row)
    }

    async fn find_by_id(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: BookingId,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        into_booking(row)
    }

    async fn get(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        into_booking(row)
    }

    async fn list_by_event(
        &self,
        event_id: EventId,
        status: Option<BookingStatus>,
    ) -> StoreResult<Vec<Booking>> {
        // A NULL filter matches every status.
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 AND ($2::TEXT IS NULL OR status = $2) ORDER BY id ASC"
        ))
        .bind(event_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn find_active_by_user_and_event(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user_id: &str,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 AND event_id = $2 AND status <> 'cancelled' LIMIT 1"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        into_booking(row)
    }

    async fn count_by_status(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        event_id: EventId,
        status: BookingStatus,
    ) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE event_id = $1 AND status = $2")
                .bind(event_id)
                .bind(status.as_str())
                .fetch_one(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn update_status(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: BookingId,
        status: BookingStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE bookings SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_earliest_waitlisted(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 AND status = 'waitlisted' ORDER BY waitlist_order ASC, id ASC LIMIT 1"
        ))
        .bind(event_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        into_booking(row)
    }
}
