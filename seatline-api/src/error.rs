use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use seatline_core::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let msg = err.to_string();
        match err {
            BookingError::EventNotFound(_) | BookingError::BookingNotFound(_) => {
                AppError::NotFoundError(msg)
            }
            BookingError::BookingWindowClosed(_) | BookingError::AlreadyCancelled(_) => {
                AppError::ValidationError(msg)
            }
            BookingError::UserAlreadyBooked { .. } | BookingError::EventFullyBooked(_) => {
                AppError::ConflictError(msg)
            }
            BookingError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_core::StoreError;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_errors_map_to_stable_statuses() {
        assert_eq!(status_of(BookingError::EventNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::BookingNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::BookingWindowClosed(1)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::AlreadyCancelled(1)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::EventFullyBooked(1)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(BookingError::UserAlreadyBooked { event_id: 1, user_id: "u".to_string() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BookingError::Storage(StoreError::Unavailable("down".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
