use async_trait::async_trait;
use seatline_core::{Backend, StoreError, StoreResult, UnitOfWork};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;
use crate::booking_repo::PgBookingStore;
use crate::event_repo::PgEventStore;

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::UniqueViolation(db.message().to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

/// Postgres-backed stores sharing one pool. The serializing lock is
/// `SELECT ... FOR UPDATE` on the event row.
#[derive(Clone)]
pub struct PgBackend {
    pool: Pool<Postgres>,
    events: PgEventStore,
    bookings: PgBookingStore,
}

impl PgBackend {
    pub fn new(db: &DbClient) -> Self {
        Self {
            pool: db.pool.clone(),
            events: PgEventStore::new(db.pool.clone()),
            bookings: PgBookingStore::new(db.pool.clone()),
        }
    }
}

#[async_trait]
impl UnitOfWork for PgBackend {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        self.pool.begin().await.map_err(map_sqlx_error)
    }

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()> {
        tx.commit().await.map_err(map_sqlx_error)
    }
}

impl Backend for PgBackend {
    type Events = PgEventStore;
    type Bookings = PgBookingStore;

    fn events(&self) -> &PgEventStore {
        &self.events
    }

    fn bookings(&self) -> &PgBookingStore {
        &self.bookings
    }
}
