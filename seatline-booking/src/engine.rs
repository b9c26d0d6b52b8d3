use chrono::{DateTime, Utc};
use seatline_core::{
    Backend, Booking, BookingError, BookingId, BookingResult, BookingStatus, BookingStore, EventId,
    EventStore, NewBooking, StoreError, UnitOfWork,
};
use std::sync::Arc;
use tracing::{debug, info};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Seat allocation, cancellation and waitlist promotion for events.
///
/// Every allocation and cancellation runs as one unit of work that first
/// takes the event's serializing lock, so concurrent requests against the
/// same event execute one at a time while different events proceed in
/// parallel.
#[derive(Clone)]
pub struct BookingService<B: Backend> {
    pub(crate) backend: B,
    clock: Clock,
}

impl<B: Backend> BookingService<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for booking window checks.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reserve a seat for `user_id`, or a waitlist position when seats are
    /// gone. Nothing is written when the request is rejected.
    pub async fn allocate(&self, event_id: EventId, user_id: &str) -> BookingResult<Booking> {
        let events = self.backend.events();
        let bookings = self.backend.bookings();
        let mut tx = self.backend.begin().await?;

        let event = events
            .find_locking(&mut tx, event_id)
            .await?
            .ok_or(BookingError::EventNotFound(event_id))?;

        let now = (self.clock)();
        if !event.is_open_at(now) {
            debug!(event_id, %now, "Booking window closed");
            return Err(BookingError::BookingWindowClosed(event_id));
        }

        if bookings
            .find_active_by_user_and_event(&mut tx, user_id, event_id)
            .await?
            .is_some()
        {
            return Err(already_booked(event_id, user_id));
        }

        let confirmed = bookings
            .count_by_status(&mut tx, event_id, BookingStatus::Confirmed)
            .await?;

        let request = if confirmed < i64::from(event.max_seats) {
            NewBooking::confirmed(event_id, user_id)
        } else {
            let waitlisted = bookings
                .count_by_status(&mut tx, event_id, BookingStatus::Waitlisted)
                .await?;

            if waitlisted >= i64::from(event.waitlist_limit) {
                info!(event_id, user_id, confirmed, waitlisted, "Event fully booked");
                return Err(BookingError::EventFullyBooked(event_id));
            }
            // Below waitlist_limit, so it fits in i32.
            NewBooking::waitlisted(event_id, user_id, (waitlisted + 1) as i32)
        };

        let booking = bookings
            .insert(&mut tx, request)
            .await
            .map_err(|e| unique_as_already_booked(e, event_id, user_id))?;

        self.backend
            .commit(tx)
            .await
            .map_err(|e| unique_as_already_booked(e, event_id, user_id))?;

        info!(
            event_id,
            user_id,
            booking_id = booking.id,
            status = %booking.status,
            waitlist_order = ?booking.waitlist_order,
            "Booking allocated"
        );
        Ok(booking)
    }

    /// Cancel a booking. Vacating a confirmed seat promotes the earliest
    /// waitlisted booking of the same event in the same unit of work.
    pub async fn cancel(&self, booking_id: BookingId) -> BookingResult<Booking> {
        let events = self.backend.events();
        let bookings = self.backend.bookings();
        let mut tx = self.backend.begin().await?;

        let booking = bookings
            .find_by_id(&mut tx, booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled(booking_id));
        }

        events
            .find_locking(&mut tx, booking.event_id)
            .await?
            .ok_or(BookingError::EventNotFound(booking.event_id))?;

        // Re-read under the lock: a concurrent cancel of the same booking may
        // have committed while we waited.
        let booking = bookings
            .find_by_id(&mut tx, booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled(booking_id));
        }
        let was_confirmed = booking.status == BookingStatus::Confirmed;

        bookings
            .update_status(&mut tx, booking_id, BookingStatus::Cancelled)
            .await?;

        let mut promoted = None;
        if was_confirmed {
            if let Some(next) = bookings
                .find_earliest_waitlisted(&mut tx, booking.event_id)
                .await?
            {
                bookings
                    .update_status(&mut tx, next.id, BookingStatus::Confirmed)
                    .await?;
                promoted = Some(next.id);
            }
        }

        let cancelled = bookings
            .find_by_id(&mut tx, booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        self.backend.commit(tx).await?;

        info!(
            event_id = booking.event_id,
            booking_id,
            was_confirmed,
            promoted_booking_id = ?promoted,
            "Booking cancelled"
        );
        Ok(cancelled)
    }
}

fn already_booked(event_id: EventId, user_id: &str) -> BookingError {
    BookingError::UserAlreadyBooked {
        event_id,
        user_id: user_id.to_string(),
    }
}

/// The active-booking unique constraint is reported as a policy rejection.
fn unique_as_already_booked(err: StoreError, event_id: EventId, user_id: &str) -> BookingError {
    match err {
        StoreError::UniqueViolation(_) => already_booked(event_id, user_id),
        other => BookingError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use seatline_core::Event;
    use seatline_store::MemoryBackend;

    fn event(id: EventId, max_seats: i32, waitlist_limit: i32) -> Event {
        let now = Utc::now();
        Event {
            id,
            name: format!("Event {}", id),
            max_seats,
            waitlist_limit,
            price: 2500.0,
            booking_start_at: now - Duration::hours(1),
            booking_end_at: now + Duration::hours(1),
            created_at: now,
            updated_at: now,
        }
    }

    async fn service_with(events: &[Event]) -> BookingService<MemoryBackend> {
        let backend = MemoryBackend::new();
        for e in events {
            backend.events().upsert(e).await.unwrap();
        }
        BookingService::new(backend)
    }

    #[tokio::test]
    async fn test_allocate_confirms_then_waitlists_then_rejects() {
        let service = service_with(&[event(1, 2, 2)]).await;

        let a = service.allocate(1, "alice").await.unwrap();
        let b = service.allocate(1, "bob").await.unwrap();
        assert_eq!(a.status, BookingStatus::Confirmed);
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(a.waitlist_order, None);

        let c = service.allocate(1, "carol").await.unwrap();
        let d = service.allocate(1, "dave").await.unwrap();
        assert_eq!(c.status, BookingStatus::Waitlisted);
        assert_eq!(c.waitlist_order, Some(1));
        assert_eq!(d.waitlist_order, Some(2));

        let err = service.allocate(1, "erin").await.unwrap_err();
        assert!(matches!(err, BookingError::EventFullyBooked(1)));
        assert_eq!(service.list_bookings(1, None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_allocate_unknown_event() {
        let service = service_with(&[]).await;
        let err = service.allocate(99, "alice").await.unwrap_err();
        assert!(matches!(err, BookingError::EventNotFound(99)));
    }

    #[tokio::test]
    async fn test_allocate_rejects_active_duplicate_but_allows_after_cancel() {
        let service = service_with(&[event(1, 5, 0)]).await;

        let first = service.allocate(1, "alice").await.unwrap();
        let err = service.allocate(1, "alice").await.unwrap_err();
        assert!(matches!(err, BookingError::UserAlreadyBooked { event_id: 1, .. }));

        service.cancel(first.id).await.unwrap();
        let again = service.allocate(1, "alice").await.unwrap();
        assert_eq!(again.status, BookingStatus::Confirmed);
        assert_ne!(again.id, first.id);
    }

    #[tokio::test]
    async fn test_booking_window_boundaries() {
        let ev = event(1, 5, 0);
        let (start, end) = (ev.booking_start_at, ev.booking_end_at);
        let backend = MemoryBackend::new();
        backend.events().upsert(&ev).await.unwrap();

        let at = |instant: DateTime<Utc>| BookingService::new(backend.clone()).with_clock(move || instant);

        let err = at(start - Duration::seconds(1)).allocate(1, "early").await.unwrap_err();
        assert!(matches!(err, BookingError::BookingWindowClosed(1)));
        let err = at(end + Duration::seconds(1)).allocate(1, "late").await.unwrap_err();
        assert!(matches!(err, BookingError::BookingWindowClosed(1)));

        assert!(at(start).allocate(1, "opening").await.is_ok());
        assert!(at(end).allocate(1, "closing").await.is_ok());
        assert_eq!(service_count(&backend, 1).await, 2);
    }

    async fn service_count(backend: &MemoryBackend, event_id: EventId) -> usize {
        backend.bookings().list_by_event(event_id, None).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_cancel_confirmed_promotes_first_waitlisted() {
        let service = service_with(&[event(1, 1, 3)]).await;

        let seat = service.allocate(1, "holder").await.unwrap();
        let w1 = service.allocate(1, "w1").await.unwrap();
        let w2 = service.allocate(1, "w2").await.unwrap();

        let cancelled = service.cancel(seat.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let promoted = service.get_booking(w1.id).await.unwrap();
        assert_eq!(promoted.status, BookingStatus::Confirmed);
        // Order value is left in place after promotion.
        assert_eq!(promoted.waitlist_order, Some(1));

        let still_waiting = service.get_booking(w2.id).await.unwrap();
        assert_eq!(still_waiting.status, BookingStatus::Waitlisted);
        assert_eq!(still_waiting.waitlist_order, Some(2));
    }

    #[tokio::test]
    async fn test_cancel_waitlisted_promotes_nobody() {
        let service = service_with(&[event(1, 1, 3)]).await;

        service.allocate(1, "holder").await.unwrap();
        let w1 = service.allocate(1, "w1").await.unwrap();
        let w2 = service.allocate(1, "w2").await.unwrap();

        service.cancel(w1.id).await.unwrap();
        assert_eq!(service.get_booking(w2.id).await.unwrap().status, BookingStatus::Waitlisted);

        let status = service.event_status(1).await.unwrap();
        assert_eq!(status.confirmed, 1);
        assert_eq!(status.waitlisted, 1);
    }

    #[tokio::test]
    async fn test_cancel_without_waitlist_changes_nothing_else() {
        let service = service_with(&[event(1, 3, 2)]).await;

        let a = service.allocate(1, "a").await.unwrap();
        let b = service.allocate(1, "b").await.unwrap();
        let before = service.get_booking(b.id).await.unwrap();

        service.cancel(a.id).await.unwrap();

        assert_eq!(service.get_booking(b.id).await.unwrap(), before);
        let status = service.event_status(1).await.unwrap();
        assert_eq!(status.confirmed, 1);
        assert_eq!(status.seats_available, 2);
    }

    #[tokio::test]
    async fn test_cancel_twice_fails_without_side_effects() {
        let service = service_with(&[event(1, 1, 1)]).await;

        let seat = service.allocate(1, "holder").await.unwrap();
        let waiting = service.allocate(1, "waiting").await.unwrap();
        service.cancel(seat.id).await.unwrap();
        let snapshot = service.list_bookings(1, None).await.unwrap();

        let err = service.cancel(seat.id).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyCancelled(id) if id == seat.id));
        assert_eq!(service.list_bookings(1, None).await.unwrap(), snapshot);
        assert_eq!(service.get_booking(waiting.id).await.unwrap().status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_booking() {
        let service = service_with(&[]).await;
        let err = service.cancel(12345).await.unwrap_err();
        assert!(matches!(err, BookingError::BookingNotFound(12345)));
    }

    #[tokio::test]
    async fn test_storage_failure_is_propagated() {
        let service = service_with(&[event(1, 1, 0)]).await;
        service.backend().set_offline(true);

        let err = service.allocate(1, "alice").await.unwrap_err();
        assert!(matches!(err, BookingError::Storage(StoreError::Unavailable(_))));

        service.backend().set_offline(false);
        assert!(service.list_bookings(1, None).await.unwrap().is_empty());
    }
}
