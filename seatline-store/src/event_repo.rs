use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seatline_core::{Event, EventId, EventStore, StoreResult};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::map_sqlx_error;

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    name: String,
    max_seats: i32,
    waitlist_limit: i32,
    price: f64,
    booking_start_at: DateTime<Utc>,
    booking_end_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            name: row.name,
            max_seats: row.max_seats,
            waitlist_limit: row.waitlist_limit,
            price: row.price,
            booking_start_at: row.booking_start_at,
            booking_end_at: row.booking_end_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_EVENT: &str = "SELECT id, name, max_seats, waitlist_limit, price, booking_start_at, booking_end_at, created_at, updated_at FROM events WHERE id = $1";

#[async_trait]
impl EventStore<Transaction<'static, Postgres>> for PgEventStore {
    async fn find_locking(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: EventId,
    ) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!("{SELECT_EVENT} FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Event::from))
    }

    async fn find(&self, id: EventId) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(SELECT_EVENT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Event::from))
    }

    async fn upsert(&self, event: &Event) -> StoreResult<()> {
        // created_at is only written on first insert.
        sqlx::query(
            r#"
            INSERT INTO events (id, name, max_seats, waitlist_limit, price, booking_start_at, booking_end_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                max_seats = EXCLUDED.max_seats,
                waitlist_limit = EXCLUDED.waitlist_limit,
                price = EXCLUDED.price,
                booking_start_at = EXCLUDED.booking_start_at,
                booking_end_at = EXCLUDED.booking_end_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(event.max_seats)
        .bind(event.waitlist_limit)
        .bind(event.price)
        .bind(event.booking_start_at)
        .bind(event.booking_end_at)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
