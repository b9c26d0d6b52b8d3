use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use seatline_booking::EventStatus;
use seatline_core::{Backend, EventId};
use serde::Serialize;

use crate::bookings::path_id;
use crate::error::AppError;
use crate::state::AppState;

/// Flattened occupancy view served to clients.
#[derive(Debug, Serialize)]
pub struct EventStatusResponse {
    pub id: EventId,
    pub name: String,
    pub max_seats: i32,
    pub waitlist_limit: i32,
    pub price: f64,
    pub booking_start_at: DateTime<Utc>,
    pub booking_end_at: DateTime<Utc>,
    pub confirmed_count: i64,
    pub waitlisted_count: i64,
    pub seats_available: i64,
}

impl From<EventStatus> for EventStatusResponse {
    fn from(s: EventStatus) -> Self {
        Self {
            id: s.event.id,
            name: s.event.name,
            max_seats: s.event.max_seats,
            waitlist_limit: s.event.waitlist_limit,
            price: s.event.price,
            booking_start_at: s.event.booking_start_at,
            booking_end_at: s.event.booking_end_at,
            confirmed_count: s.confirmed,
            waitlisted_count: s.waitlisted,
            seats_available: s.seats_available,
        }
    }
}

pub fn routes<B: Backend>() -> Router<AppState<B>> {
    Router::new().route("/api/v1/events/{id}/status", get(event_status::<B>))
}

async fn event_status<B: Backend>(
    State(state): State<AppState<B>>,
    path: Result<Path<EventId>, PathRejection>,
) -> Result<Json<EventStatusResponse>, AppError> {
    let event_id = path_id(path)?;
    let status = state.bookings.event_status(event_id).await?;
    Ok(Json(status.into()))
}
