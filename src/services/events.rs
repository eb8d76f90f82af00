use std::sync::Arc;

use crate::models::dates::now;
use crate::models::{Booking, BookingEvent};
use crate::state::AppState;

pub fn publish_booking_event(state: &Arc<AppState>, booking: &Booking, reason: &str) {
    let event = BookingEvent {
        booking_id: booking.id.clone(),
        room_id: booking.room_id.clone(),
        status: booking.status,
        payment_status: booking.payment_status,
        reason: reason.to_string(),
        at: now(),
    };

    tracing::info!(
        booking_id = %booking.id,
        status = booking.status.as_str(),
        payment_status = booking.payment_status.as_str(),
        reason,
        "booking state changed"
    );

    // No admin listening is fine.
    let _ = state.booking_tx.send(event);
}
