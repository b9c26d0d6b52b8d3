//! In-process backend with the same locking contract as Postgres.
//!
//! Committed rows live in a table map behind a short-held mutex that is never
//! held across an await. The event row lock is an async mutex per event id,
//! created on first access and owned by the unit of work until it commits or
//! is dropped. Writes are staged in the unit of work and become visible to
//! others only on commit.

use async_trait::async_trait;
use chrono::Utc;
use seatline_core::{
    Backend, Booking, BookingId, BookingStatus, BookingStore, Event, EventId, EventStore,
    NewBooking, StoreError, StoreResult, UnitOfWork,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    bookings: BTreeMap<BookingId, Booking>,
}

struct Shared {
    tables: Mutex<Tables>,
    event_locks: Mutex<HashMap<EventId, Arc<AsyncMutex<()>>>>,
    next_booking_id: AtomicI64,
    offline: AtomicBool,
}

impl Shared {
    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory tables poisoned".to_string()))
    }

    fn event_lock(&self, id: EventId) -> StoreResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .event_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("memory lock table poisoned".to_string()))?;
        Ok(locks.entry(id).or_default().clone())
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend is offline".to_string()));
        }
        Ok(())
    }
}

/// Unit of work for [`MemoryBackend`].
#[derive(Default)]
pub struct MemoryTx {
    held: HashMap<EventId, OwnedMutexGuard<()>>,
    staged: BTreeMap<BookingId, Booking>,
}

impl MemoryTx {
    fn lookup(&self, tables: &Tables, id: BookingId) -> Option<Booking> {
        self.staged
            .get(&id)
            .or_else(|| tables.bookings.get(&id))
            .cloned()
    }

    /// Committed rows of the event overlaid with this unit of work's writes.
    fn visible(&self, tables: &Tables, event_id: EventId) -> Vec<Booking> {
        let mut rows: BTreeMap<BookingId, &Booking> = tables
            .bookings
            .iter()
            .filter(|(_, b)| b.event_id == event_id)
            .map(|(id, b)| (*id, b))
            .collect();
        for (id, b) in self.staged.iter().filter(|(_, b)| b.event_id == event_id) {
            rows.insert(*id, b);
        }
        rows.into_values().cloned().collect()
    }
}

#[derive(Clone)]
pub struct MemoryEventStore {
    shared: Arc<Shared>,
}

#[derive(Clone)]
pub struct MemoryBookingStore {
    shared: Arc<Shared>,
}

#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
    events: MemoryEventStore,
    bookings: MemoryBookingStore,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            tables: Mutex::new(Tables::default()),
            event_locks: Mutex::new(HashMap::new()),
            next_booking_id: AtomicI64::new(1),
            offline: AtomicBool::new(false),
        });

        Self {
            events: MemoryEventStore { shared: shared.clone() },
            bookings: MemoryBookingStore { shared: shared.clone() },
            shared,
        }
    }

    /// While offline every operation fails with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitOfWork for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        self.shared.check_online()?;
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> StoreResult<()> {
        self.shared.check_online()?;
        let mut tables = self.shared.tables()?;

        // Same guarantee as the partial unique index on active bookings.
        for booking in tx.staged.values().filter(|b| b.status.is_active()) {
            let committed_clash = tables.bookings.values().any(|other| {
                other.id != booking.id
                    && !tx.staged.contains_key(&other.id)
                    && other.event_id == booking.event_id
                    && other.user_id == booking.user_id
                    && other.status.is_active()
            });
            let staged_clash = tx.staged.values().any(|other| {
                other.id != booking.id
                    && other.event_id == booking.event_id
                    && other.user_id == booking.user_id
                    && other.status.is_active()
            });
            if committed_clash || staged_clash {
                return Err(StoreError::UniqueViolation(format!(
                    "active booking exists for user {} on event {}",
                    booking.user_id, booking.event_id
                )));
            }
        }

        let MemoryTx { held, staged } = tx;
        tables.bookings.extend(staged);
        drop(tables);
        drop(held);
        Ok(())
    }
}

impl Backend for MemoryBackend {
    type Events = MemoryEventStore;
    type Bookings = MemoryBookingStore;

    fn events(&self) -> &MemoryEventStore {
        &self.events
    }

    fn bookings(&self) -> &MemoryBookingStore {
        &self.bookings
    }
}

#[async_trait]
impl EventStore<MemoryTx> for MemoryEventStore {
    async fn find_locking(&self, tx: &mut MemoryTx, id: EventId) -> StoreResult<Option<Event>> {
        self.shared.check_online()?;
        // Like FOR UPDATE, a missing row takes no lock.
        if !self.shared.tables()?.events.contains_key(&id) {
            return Ok(None);
        }

        if !tx.held.contains_key(&id) {
            let lock = self.shared.event_lock(id)?;
            let guard = lock.lock_owned().await;
            tx.held.insert(id, guard);
        }

        Ok(self.shared.tables()?.events.get(&id).cloned())
    }

    async fn find(&self, id: EventId) -> StoreResult<Option<Event>> {
        self.shared.check_online()?;
        Ok(self.shared.tables()?.events.get(&id).cloned())
    }

    async fn upsert(&self, event: &Event) -> StoreResult<()> {
        self.shared.check_online()?;
        // Waits for any unit of work holding the row.
        let lock = self.shared.event_lock(event.id)?;
        let _row = lock.lock().await;

        let mut tables = self.shared.tables()?;
        match tables.events.get_mut(&event.id) {
            Some(existing) => {
                existing.name = event.name.clone();
                existing.max_seats = event.max_seats;
                existing.waitlist_limit = event.waitlist_limit;
                existing.price = event.price;
                existing.booking_start_at = event.booking_start_at;
                existing.booking_end_at = event.booking_end_at;
                existing.updated_at = event.updated_at;
            }
            None => {
                tables.events.insert(event.id, event.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore<MemoryTx> for MemoryBookingStore {
    async fn insert(&self, tx: &mut MemoryTx, booking: NewBooking) -> StoreResult<Booking> {
        self.shared.check_online()?;
        {
            let tables = self.shared.tables()?;
            let duplicate = booking.status.is_active()
                && tx
                    .visible(&tables, booking.event_id)
                    .iter()
                    .any(|b| b.user_id == booking.user_id && b.status.is_active());
            if duplicate {
                return Err(StoreError::UniqueViolation(format!(
                    "active booking exists for user {} on event {}",
                    booking.user_id, booking.event_id
                )));
            }
        }

        let id = self.shared.next_booking_id.fetch_add(1, Ordering::SeqCst);
        let created = booking.into_booking(id, Utc::now());
        tx.staged.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, tx: &mut MemoryTx, id: BookingId) -> StoreResult<Option<Booking>> {
        self.shared.check_online()?;
        let tables = self.shared.tables()?;
        Ok(tx.lookup(&tables, id))
    }

    async fn get(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        self.shared.check_online()?;
        Ok(self.shared.tables()?.bookings.get(&id).cloned())
    }

    async fn list_by_event(
        &self,
        event_id: EventId,
        status: Option<BookingStatus>,
    ) -> StoreResult<Vec<Booking>> {
        self.shared.check_online()?;
        let tables = self.shared.tables()?;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.event_id == event_id && status.map_or(true, |s| b.status == s))
            .cloned()
            .collect())
    }

    async fn find_active_by_user_and_event(
        &self,
        tx: &mut MemoryTx,
        user_id: &str,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>> {
        self.shared.check_online()?;
        let tables = self.shared.tables()?;
        Ok(tx
            .visible(&tables, event_id)
            .into_iter()
            .find(|b| b.user_id == user_id && b.status.is_active()))
    }

    async fn count_by_status(
        &self,
        tx: &mut MemoryTx,
        event_id: EventId,
        status: BookingStatus,
    ) -> StoreResult<i64> {
        self.shared.check_online()?;
        let tables = self.shared.tables()?;
        let count = tx
            .visible(&tables, event_id)
            .iter()
            .filter(|b| b.status == status)
            .count();
        Ok(count as i64)
    }

    async fn update_status(
        &self,
        tx: &mut MemoryTx,
        id: BookingId,
        status: BookingStatus,
    ) -> StoreResult<()> {
        self.shared.check_online()?;
        let tables = self.shared.tables()?;
        // Updating a missing row affects nothing, as in SQL.
        if let Some(mut booking) = tx.lookup(&tables, id) {
            booking.status = status;
            booking.updated_at = Utc::now();
            tx.staged.insert(id, booking);
        }
        Ok(())
    }

    async fn find_earliest_waitlisted(
        &self,
        tx: &mut MemoryTx,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>> {
        self.shared.check_online()?;
        let tables = self.shared.tables()?;
        Ok(tx
            .visible(&tables, event_id)
            .into_iter()
            .filter(|b| b.status == BookingStatus::Waitlisted)
            .min_by_key(|b| (b.waitlist_order.unwrap_or(i32::MAX), b.id)))
    }
}
