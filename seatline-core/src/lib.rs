pub mod feed;
pub mod models;
pub mod repository;

pub use feed::{Delivery, MessageHandler};
pub use models::{Booking, BookingId, BookingStatus, Event, EventId, NewBooking};
pub use repository::{Backend, BookingStore, EventStore, UnitOfWork};

/// Failures reported by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Stored row is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Every way an allocation, cancellation or lookup can fail.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Event not found: {0}")]
    EventNotFound(EventId),
    #[error("Booking is not open for event {0}")]
    BookingWindowClosed(EventId),
    #[error("User {user_id} already has an active booking for event {event_id}")]
    UserAlreadyBooked { event_id: EventId, user_id: String },
    #[error("Event {0} is fully booked (seats + waitlist)")]
    EventFullyBooked(EventId),
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),
    #[error("Booking {0} is already cancelled")]
    AlreadyCancelled(BookingId),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl BookingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BookingError::EventNotFound(_) | BookingError::BookingNotFound(_))
    }

    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            BookingError::BookingWindowClosed(_)
                | BookingError::UserAlreadyBooked { .. }
                | BookingError::EventFullyBooked(_)
                | BookingError::AlreadyCancelled(_)
        )
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
