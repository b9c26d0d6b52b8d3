use seatline_core::{
    Backend, Booking, BookingError, BookingId, BookingResult, BookingStatus, BookingStore, Event,
    EventId, EventStore, UnitOfWork,
};
use serde::Serialize;

use crate::engine::BookingService;

/// Occupancy summary of one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventStatus {
    pub event: Event,
    pub confirmed: i64,
    pub waitlisted: i64,
    /// Never negative, even if the upstream capacity shrank below the
    /// confirmed count.
    pub seats_available: i64,
}

impl EventStatus {
    pub fn new(event: Event, confirmed: i64, waitlisted: i64) -> Self {
        let seats_available = (i64::from(event.max_seats) - confirmed).max(0);
        Self {
            event,
            confirmed,
            waitlisted,
            seats_available,
        }
    }
}

// Read-only queries. None of these take the event lock.
impl<B: Backend> BookingService<B> {
    pub async fn get_booking(&self, id: BookingId) -> BookingResult<Booking> {
        self.backend
            .bookings()
            .get(id)
            .await?
            .ok_or(BookingError::BookingNotFound(id))
    }

    pub async fn list_bookings(
        &self,
        event_id: EventId,
        status: Option<BookingStatus>,
    ) -> BookingResult<Vec<Booking>> {
        Ok(self.backend.bookings().list_by_event(event_id, status).await?)
    }

    pub async fn event_status(&self, event_id: EventId) -> BookingResult<EventStatus> {
        let event = self
            .backend
            .events()
            .find(event_id)
            .await?
            .ok_or(BookingError::EventNotFound(event_id))?;

        // Both counts from one unit of work, discarded afterwards.
        let bookings = self.backend.bookings();
        let mut tx = self.backend.begin().await?;
        let confirmed = bookings
            .count_by_status(&mut tx, event_id, BookingStatus::Confirmed)
            .await?;
        let waitlisted = bookings
            .count_by_status(&mut tx, event_id, BookingStatus::Waitlisted)
            .await?;
        drop(tx);

        Ok(EventStatus::new(event, confirmed, waitlisted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use seatline_store::MemoryBackend;

    fn event(max_seats: i32) -> Event {
        let now = Utc::now();
        Event {
            id: 5,
            name: "Status".to_string(),
            max_seats,
            waitlist_limit: 1,
            price: 10.0,
            booking_start_at: now - Duration::hours(1),
            booking_end_at: now + Duration::hours(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_seats_available_is_clamped() {
        assert_eq!(EventStatus::new(event(10), 4, 0).seats_available, 6);
        assert_eq!(EventStatus::new(event(2), 5, 1).seats_available, 0);
    }

    #[tokio::test]
    async fn test_event_status_counts() {
        let backend = MemoryBackend::new();
        backend.events().upsert(&event(2)).await.unwrap();
        let service = BookingService::new(backend);

        for user in ["a", "b", "c"] {
            service.allocate(5, user).await.unwrap();
        }

        let status = service.event_status(5).await.unwrap();
        assert_eq!(status.confirmed, 2);
        assert_eq!(status.waitlisted, 1);
        assert_eq!(status.seats_available, 0);
        assert_eq!(status.event.name, "Status");

        assert!(matches!(service.event_status(6).await, Err(BookingError::EventNotFound(6))));
    }

    #[tokio::test]
    async fn test_list_and_get_bookings() {
        let backend = MemoryBackend::new();
        backend.events().upsert(&event(1)).await.unwrap();
        let service = BookingService::new(backend);

        let first = service.allocate(5, "a").await.unwrap();
        let second = service.allocate(5, "b").await.unwrap();

        let all = service.list_bookings(5, None).await.unwrap();
        assert_eq!(all.iter().map(|b| b.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        let waiting = service
            .list_bookings(5, Some(BookingStatus::Waitlisted))
            .await
            .unwrap();
        assert_eq!(waiting, vec![second.clone()]);

        assert!(service.list_bookings(404, None).await.unwrap().is_empty());
        assert_eq!(service.get_booking(first.id).await.unwrap().user_id, "a");
        assert!(matches!(
            service.get_booking(9999).await,
            Err(BookingError::BookingNotFound(9999))
        ));
    }
}
