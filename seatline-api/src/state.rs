use seatline_booking::BookingService;
use seatline_core::Backend;

#[derive(Clone)]
pub struct AppState<B: Backend> {
    pub bookings: BookingService<B>,
}

impl<B: Backend> AppState<B> {
    pub fn new(bookings: BookingService<B>) -> Self {
        Self { bookings }
    }
}
