use axum::http::StatusCode;
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Room, RoomStatus};

#[derive(Debug)]
pub enum SchedulingError {
    InvalidDates,
    RoomUnavailable { status: RoomStatus },
    OccupancyExceeded { max: i64, requested: i64 },
    Conflict { checkin: NaiveDate, checkout: NaiveDate },
    Lookup(String),
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::InvalidDates => {
                write!(f, "Check-out date must be after check-in date")
            }
            SchedulingError::RoomUnavailable { status } => {
                write!(
                    f,
                    "This room is currently {} and cannot be booked",
                    status.as_str()
                )
            }
            SchedulingError::OccupancyExceeded { max, requested } => {
                write!(
                    f,
                    "This room holds at most {max} guests, {requested} were requested"
                )
            }
            SchedulingError::Conflict { checkin, checkout } => {
                write!(
                    f,
                    "The room is already booked from {checkin} to {checkout}. Please choose different dates"
                )
            }
            SchedulingError::Lookup(e) => write!(f, "failed to check room availability: {e}"),
        }
    }
}

impl std::error::Error for SchedulingError {}

impl SchedulingError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulingError::InvalidDates => "invalid_booking_dates",
            SchedulingError::RoomUnavailable { .. } => "room_unavailable",
            SchedulingError::OccupancyExceeded { .. } => "occupancy_exceeded",
            SchedulingError::Conflict { .. } => "booking_conflict",
            SchedulingError::Lookup(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SchedulingError::InvalidDates | SchedulingError::OccupancyExceeded { .. } => {
                StatusCode::BAD_REQUEST
            }
            SchedulingError::RoomUnavailable { .. } | SchedulingError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            SchedulingError::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn check_dates(checkin: NaiveDate, checkout: NaiveDate) -> Result<i64, SchedulingError> {
    if checkin >= checkout {
        return Err(SchedulingError::InvalidDates);
    }
    Ok((checkout - checkin).num_days())
}

/// Gate for a new booking: dates, room status, occupancy, then overlap with
/// every non-canceled booking on the room over [checkin, checkout).
pub fn validate_booking(
    conn: &Connection,
    room: &Room,
    checkin: NaiveDate,
    checkout: NaiveDate,
    adults: i64,
    children: i64,
) -> Result<(), SchedulingError> {
    check_dates(checkin, checkout)?;

    if room.availability_status != RoomStatus::Available {
        return Err(SchedulingError::RoomUnavailable {
            status: room.availability_status,
        });
    }

    let requested = adults.max(0) + children.max(0);
    if adults < 1 || requested > room.maxcount {
        return Err(SchedulingError::OccupancyExceeded {
            max: room.maxcount,
            requested,
        });
    }

    let overlapping = queries::get_overlapping_bookings(conn, &room.id, &checkin, &checkout)
        .map_err(|e| SchedulingError::Lookup(e.to_string()))?;

    if let Some(existing) = overlapping.iter().find(|b| b.overlaps(checkin, checkout)) {
        return Err(SchedulingError::Conflict {
            checkin: existing.checkin,
            checkout: existing.checkout,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Booking, BookingStatus, PaymentMethod, PaymentStatus};

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::save_room(&conn, &room()).unwrap();
        conn
    }

    fn room() -> Room {
        Room {
            id: "room-1".to_string(),
            hotel_id: None,
            name: "Deluxe 101".to_string(),
            room_type: "Deluxe".to_string(),
            maxcount: 3,
            beds: 1,
            baths: 1,
            phonenumber: None,
            rentperday: 1_000_000,
            description: None,
            availability_status: RoomStatus::Available,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn insert_booking(conn: &Connection, id: &str, checkin: &str, checkout: &str, status: BookingStatus) {
        let now = chrono::Utc::now().naive_utc();
        let booking = Booking {
            id: id.to_string(),
            room_id: "room-1".to_string(),
            user_id: None,
            customer_name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: None,
            checkin: d(checkin),
            checkout: d(checkout),
            adults: 2,
            children: 0,
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Cash,
            applied_vouchers: vec![],
            base_amount: 2_000_000,
            total_amount: 2_000_000,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };
        queries::create_booking(conn, &booking).unwrap();
    }

    #[test]
    fn test_valid_empty_room() {
        let conn = setup_db();
        let result = validate_booking(&conn, &room(), d("2025-06-10"), d("2025-06-12"), 2, 1);
        assert!(result.is_ok());
    }

    #[test]
    fn test_checkout_must_follow_checkin() {
        let conn = setup_db();
        let result = validate_booking(&conn, &room(), d("2025-06-12"), d("2025-06-12"), 2, 0);
        assert!(matches!(result.unwrap_err(), SchedulingError::InvalidDates));
    }

    #[test]
    fn test_room_in_maintenance_rejected() {
        let conn = setup_db();
        let mut r = room();
        r.availability_status = RoomStatus::Maintenance;
        let result = validate_booking(&conn, &r, d("2025-06-10"), d("2025-06-12"), 1, 0);
        assert!(matches!(
            result.unwrap_err(),
            SchedulingError::RoomUnavailable { status: RoomStatus::Maintenance }
        ));
    }

    #[test]
    fn test_occupancy_exceeded() {
        let conn = setup_db();
        let result = validate_booking(&conn, &room(), d("2025-06-10"), d("2025-06-12"), 2, 2);
        assert!(matches!(
            result.unwrap_err(),
            SchedulingError::OccupancyExceeded { max: 3, requested: 4 }
        ));
    }

    #[test]
    fn test_overlapping_booking_conflicts() {
        let conn = setup_db();
        insert_booking(&conn, "b1", "2025-06-10", "2025-06-12", BookingStatus::Confirmed);

        let result = validate_booking(&conn, &room(), d("2025-06-11"), d("2025-06-13"), 2, 0);
        assert!(matches!(result.unwrap_err(), SchedulingError::Conflict { .. }));
    }

    #[test]
    fn test_adjacent_booking_does_not_conflict() {
        let conn = setup_db();
        insert_booking(&conn, "b1", "2025-06-10", "2025-06-12", BookingStatus::Confirmed);

        // Checkout of the existing stay equals checkin of the new one
        let after = validate_booking(&conn, &room(), d("2025-06-12"), d("2025-06-14"), 2, 0);
        assert!(after.is_ok());
        let before = validate_booking(&conn, &room(), d("2025-06-08"), d("2025-06-10"), 2, 0);
        assert!(before.is_ok());
    }

    #[test]
    fn test_canceled_booking_never_conflicts() {
        let conn = setup_db();
        insert_booking(&conn, "b1", "2025-06-10", "2025-06-12", BookingStatus::Canceled);

        let result = validate_booking(&conn, &room(), d("2025-06-10"), d("2025-06-12"), 2, 0);
        assert!(result.is_ok());
    }
}
