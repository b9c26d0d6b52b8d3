use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type EventId = i64;
pub type BookingId = i64;

/// Local replica of an upstream event definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub max_seats: i32,
    pub waitlist_limit: i32,
    pub price: f64,
    pub booking_start_at: DateTime<Utc>,
    pub booking_end_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Both window bounds are inclusive: the instant equal to
    /// `booking_end_at` still accepts bookings.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        !(now < self.booking_start_at || now > self.booking_end_at)
    }

    /// Checks the invariants every stored event must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.max_seats < 1 {
            return Err(format!("max_seats must be at least 1, got {}", self.max_seats));
        }
        if self.waitlist_limit < 0 {
            return Err(format!("waitlist_limit must not be negative, got {}", self.waitlist_limit));
        }
        if self.booking_start_at >= self.booking_end_at {
            return Err("booking_start_at must be before booking_end_at".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Waitlisted,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Waitlisted => "waitlisted",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        *self != BookingStatus::Cancelled
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "waitlisted" => Ok(BookingStatus::Waitlisted),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub event_id: EventId,
    pub user_id: String,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_order: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A booking that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub event_id: EventId,
    pub user_id: String,
    pub status: BookingStatus,
    pub waitlist_order: Option<i32>,
}

impl NewBooking {
    pub fn confirmed(event_id: EventId, user_id: impl Into<String>) -> Self {
        Self {
            event_id,
            user_id: user_id.into(),
            status: BookingStatus::Confirmed,
            waitlist_order: None,
        }
    }

    pub fn waitlisted(event_id: EventId, user_id: impl Into<String>, order: i32) -> Self {
        Self {
            event_id,
            user_id: user_id.into(),
            status: BookingStatus::Waitlisted,
            waitlist_order: Some(order),
        }
    }

    pub fn into_booking(self, id: BookingId, now: DateTime<Utc>) -> Booking {
        Booking {
            id,
            event_id: self.event_id,
            user_id: self.user_id,
            status: self.status,
            waitlist_order: self.waitlist_order,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id: 1,
            name: "Rust Meetup".to_string(),
            max_seats: 10,
            waitlist_limit: 2,
            price: 0.0,
            booking_start_at: start,
            booking_end_at: end,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let ev = event(start, end);

        assert!(ev.is_open_at(start));
        assert!(ev.is_open_at(end));
        assert!(!ev.is_open_at(start - Duration::milliseconds(1)));
        assert!(!ev.is_open_at(end + Duration::milliseconds(1)));
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let start = Utc::now();
        let ev = event(start, start);
        assert!(ev.validate().is_err());

        let mut ev = event(start, start + Duration::minutes(5));
        assert!(ev.validate().is_ok());
        ev.max_seats = 0;
        assert!(ev.validate().is_err());
    }

    #[test]
    fn test_status_string_mapping() {
        for status in [BookingStatus::Confirmed, BookingStatus::Waitlisted, BookingStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("CONFIRMED".parse::<BookingStatus>().is_err());
        assert_eq!(serde_json::to_string(&BookingStatus::Waitlisted).unwrap(), "\"waitlisted\"");
    }
}
