use async_trait::async_trait;
use crate::models::{Booking, BookingId, BookingStatus, Event, EventId, NewBooking};
use crate::StoreResult;

/// Transaction boundary. Dropping a `Tx` without committing rolls it back
/// and releases every lock it holds.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
}

/// Repository trait for event data access
#[async_trait]
pub trait EventStore<Tx: Send>: Send + Sync {
    /// Exclusive read of the event row, held until `tx` commits or is dropped.
    async fn find_locking(&self, tx: &mut Tx, id: EventId) -> StoreResult<Option<Event>>;

    async fn find(&self, id: EventId) -> StoreResult<Option<Event>>;

    /// Insert, or overwrite every mutable field of an existing row.
    async fn upsert(&self, event: &Event) -> StoreResult<()>;
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingStore<Tx: Send>: Send + Sync {
    async fn insert(&self, tx: &mut Tx, booking: NewBooking) -> StoreResult<Booking>;

    async fn find_by_id(&self, tx: &mut Tx, id: BookingId) -> StoreResult<Option<Booking>>;

    /// Unlocked lookup for read paths.
    async fn get(&self, id: BookingId) -> StoreResult<Option<Booking>>;

    /// Bookings of an event ordered by id.
    async fn list_by_event(
        &self,
        event_id: EventId,
        status: Option<BookingStatus>,
    ) -> StoreResult<Vec<Booking>>;

    async fn find_active_by_user_and_event(
        &self,
        tx: &mut Tx,
        user_id: &str,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>>;

    async fn count_by_status(
        &self,
        tx: &mut Tx,
        event_id: EventId,
        status: BookingStatus,
    ) -> StoreResult<i64>;

    async fn update_status(
        &self,
        tx: &mut Tx,
        id: BookingId,
        status: BookingStatus,
    ) -> StoreResult<()>;

    /// Lowest `(waitlist_order, id)` among the event's waitlisted bookings.
    async fn find_earliest_waitlisted(
        &self,
        tx: &mut Tx,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>>;
}

/// A storage backend: one transaction type shared by both stores.
pub trait Backend: UnitOfWork + Clone + 'static {
    type Events: EventStore<Self::Tx>;
    type Bookings: BookingStore<Self::Tx>;

    fn events(&self) -> &Self::Events;

    fn bookings(&self) -> &Self::Bookings;
}
