use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use seatline_core::{Backend, Booking, BookingId, BookingStatus, EventId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsParams {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: BookingId,
    pub event_id: EventId,
    pub user_id: String,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_order: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            event_id: b.event_id,
            user_id: b.user_id,
            status: b.status,
            waitlist_order: b.waitlist_order,
            created_at: b.created_at,
        }
    }
}

pub fn routes<B: Backend>() -> Router<AppState<B>> {
    Router::new()
        .route(
            "/api/v1/events/{id}/bookings",
            post(create_booking::<B>).get(list_bookings::<B>),
        )
        .route(
            "/api/v1/bookings/{id}",
            get(get_booking::<B>).delete(cancel_booking::<B>),
        )
}

pub(crate) fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| AppError::ValidationError(format!("Invalid id: {}", e.body_text())))
}

async fn create_booking<B: Backend>(
    State(state): State<AppState<B>>,
    path: Result<Path<EventId>, PathRejection>,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let event_id = path_id(path)?;
    let Json(req) =
        body.map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e.body_text())))?;

    // Opaque identifier: blank is rejected, anything else is stored verbatim.
    if req.user_id.trim().is_empty() {
        return Err(AppError::ValidationError("user_id is required".to_string()));
    }

    let booking = state.bookings.allocate(event_id, &req.user_id).await?;
    info!(
        booking_id = booking.id,
        event_id,
        status = %booking.status,
        "Booking created via API"
    );

    Ok((StatusCode::CREATED, Json(booking.into())))
}

async fn list_bookings<B: Backend>(
    State(state): State<AppState<B>>,
    path: Result<Path<EventId>, PathRejection>,
    query: Result<Query<ListBookingsParams>, QueryRejection>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let event_id = path_id(path)?;
    let Query(params) =
        query.map_err(|e| AppError::ValidationError(e.body_text()))?;

    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<BookingStatus>()
                .map_err(|e| AppError::ValidationError(e.to_string()))?,
        ),
    };

    let bookings = state.bookings.list_bookings(event_id, status).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

async fn get_booking<B: Backend>(
    State(state): State<AppState<B>>,
    path: Result<Path<BookingId>, PathRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    let id = path_id(path)?;
    let booking = state.bookings.get_booking(id).await?;
    Ok(Json(booking.into()))
}

async fn cancel_booking<B: Backend>(
    State(state): State<AppState<B>>,
    path: Result<Path<BookingId>, PathRejection>,
) -> Result<Json<BookingResponse>, AppError> {
    let id = path_id(path)?;
    let booking = state.bookings.cancel(id).await?;
    info!(booking_id = id, event_id = booking.event_id, "Booking cancelled via API");
    Ok(Json(booking.into()))
}
