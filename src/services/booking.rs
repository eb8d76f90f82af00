use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::dates::now;
use crate::models::{
    AppliedVoucher, Booking, BookingStatus, DiscountKind, PaymentMethod, PaymentStatus, User,
};
use crate::services::events::publish_booking_event;
use crate::services::{pricing, scheduling};
use crate::state::AppState;

pub const EXPIRED_REASON: &str = "payment window expired";

pub struct NewBooking {
    pub room_id: String,
    pub user: Option<User>,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub adults: i64,
    pub children: i64,
    pub payment_method: PaymentMethod,
    pub voucher_codes: Vec<String>,
}

/// Validates availability, prices the stay server-side and stores it as
/// pending/pending.
pub fn create_booking(conn: &Connection, new: NewBooking, today: NaiveDate) -> AppResult<Booking> {
    if new.customer_name.trim().is_empty() || new.email.trim().is_empty() {
        return Err(AppError::BadRequest("customerName and email are required".to_string()));
    }

    let room = queries::get_room(conn, &new.room_id)?
        .ok_or_else(|| AppError::NotFound(format!("room {}", new.room_id)))?;

    scheduling::validate_booking(conn, &room, new.checkin, new.checkout, new.adults, new.children)?;

    let quote = pricing::quote(
        conn,
        &room,
        new.checkin,
        new.checkout,
        today,
        new.user.as_ref(),
        Some(&new.email),
        &new.voucher_codes,
    )?;

    let applied_vouchers = quote
        .applied_discounts
        .iter()
        .map(|d| AppliedVoucher {
            code: d.code.clone().unwrap_or_else(|| d.id.clone()),
            discount: d.discount,
        })
        .collect();

    let created_at = now();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        room_id: room.id.clone(),
        user_id: new.user.as_ref().map(|u| u.id.clone()),
        customer_name: new.customer_name.trim().to_string(),
        email: new.email.trim().to_lowercase(),
        phone: new.phone,
        checkin: new.checkin,
        checkout: new.checkout,
        adults: new.adults,
        children: new.children,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: new.payment_method,
        applied_vouchers,
        base_amount: quote.base_amount,
        total_amount: quote.total_amount,
        cancel_reason: None,
        created_at,
        updated_at: created_at,
    };
    queries::create_booking(conn, &booking)?;

    tracing::info!(
        booking_id = %booking.id,
        room_id = %booking.room_id,
        total = booking.total_amount,
        method = booking.payment_method.as_str(),
        "booking created"
    );
    Ok(booking)
}

/// Guest bookings are reachable by id alone; a booking tied to an account
/// is visible to that account and to admins only.
pub fn check_access(booking: &Booking, user: Option<&User>) -> AppResult<()> {
    match (&booking.user_id, user) {
        (None, _) => Ok(()),
        (Some(_), Some(u)) if u.is_admin() => Ok(()),
        (Some(owner), Some(u)) if *owner == u.id => Ok(()),
        _ => Err(AppError::NotFound(format!("booking {}", booking.id))),
    }
}

pub fn load_booking(conn: &Connection, booking_id: &str) -> AppResult<Booking> {
    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Marks the booking confirmed and paid and records its voucher redemptions.
/// Returns the booking and whether anything changed.
pub fn confirm_booking(conn: &mut Connection, booking_id: &str) -> AppResult<(Booking, bool)> {
    let tx = conn.transaction()?;
    let booking = load_booking(&tx, booking_id)?;

    match booking.status {
        BookingStatus::Canceled => {
            return Err(AppError::Conflict(
                "This booking has been canceled and can no longer be confirmed".to_string(),
            ));
        }
        BookingStatus::Confirmed if booking.payment_status == PaymentStatus::Paid => {
            return Ok((booking, false));
        }
        _ => {}
    }

    // Single use is enforced again here: two pending bookings may have been
    // priced before either was confirmed.
    let mut redemptions = Vec::with_capacity(booking.applied_vouchers.len());
    for voucher in &booking.applied_vouchers {
        let discount = match queries::get_discount_by_code(&tx, &voucher.code)? {
            Some(d) => Some(d),
            None => queries::get_discount(&tx, &voucher.code)?,
        };
        let Some(discount) = discount else {
            tracing::warn!(
                booking_id = %booking.id,
                code = %voucher.code,
                "applied discount no longer exists, redemption not recorded"
            );
            continue;
        };
        if discount.kind == DiscountKind::Voucher
            && queries::has_redeemed_discount(
                &tx,
                &discount.id,
                booking.user_id.as_deref(),
                Some(&booking.email),
            )?
        {
            tracing::warn!(booking_id = %booking.id, code = %voucher.code, "voucher already redeemed");
            return Err(AppError::Conflict(format!(
                "Voucher {} has already been used",
                voucher.code
            )));
        }
        redemptions.push((discount.id, voucher.discount));
    }

    queries::update_booking_status(
        &tx,
        &booking.id,
        BookingStatus::Confirmed,
        PaymentStatus::Paid,
        None,
    )?;
    for (discount_id, amount) in &redemptions {
        queries::record_discount_redemption(
            &tx,
            discount_id,
            &booking.id,
            booking.user_id.as_deref(),
            &booking.email,
            *amount,
        )?;
    }

    let confirmed = load_booking(&tx, &booking.id)?;
    tx.commit()?;
    Ok((confirmed, true))
}

pub fn cancel_booking(conn: &Connection, booking_id: &str, reason: &str) -> AppResult<Booking> {
    let booking = load_booking(conn, booking_id)?;
    if booking.status == BookingStatus::Canceled {
        return Err(AppError::Conflict("This booking is already canceled".to_string()));
    }

    // A paid stay keeps its payment record.
    let payment_status = match booking.payment_status {
        PaymentStatus::Paid => PaymentStatus::Paid,
        _ => PaymentStatus::Canceled,
    };
    let reason = reason.trim();
    let reason = if reason.is_empty() { "canceled by customer" } else { reason };

    queries::update_booking_status(
        conn,
        &booking.id,
        BookingStatus::Canceled,
        payment_status,
        Some(reason),
    )?;
    load_booking(conn, &booking.id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDeadline {
    pub time_remaining: i64,
    pub expired: bool,
    pub deadline: NaiveDateTime,
}

pub fn payment_deadline(booking: &Booking, window_minutes: i64, at: NaiveDateTime) -> PaymentDeadline {
    let deadline = booking.created_at + Duration::minutes(window_minutes);
    let remaining = (deadline - at).num_seconds().max(0);
    PaymentDeadline {
        time_remaining: if booking.is_awaiting_payment() { remaining } else { 0 },
        expired: booking.is_awaiting_payment() && remaining == 0,
        deadline,
    }
}

/// Cancels the booking if its payment window has closed. Returns the
/// canceled booking when it did.
pub fn expire_if_overdue(
    conn: &Connection,
    booking: &Booking,
    window_minutes: i64,
    at: NaiveDateTime,
) -> AppResult<Option<Booking>> {
    if !payment_deadline(booking, window_minutes, at).expired {
        return Ok(None);
    }
    queries::update_booking_status(
        conn,
        &booking.id,
        BookingStatus::Canceled,
        PaymentStatus::Canceled,
        Some(EXPIRED_REASON),
    )?;
    Ok(Some(load_booking(conn, &booking.id)?))
}

pub fn expire_overdue(conn: &Connection, window_minutes: i64, at: NaiveDateTime) -> AppResult<Vec<Booking>> {
    let cutoff = at - Duration::minutes(window_minutes);
    let overdue = queries::get_overdue_bookings(conn, &cutoff)?;

    let mut expired = Vec::with_capacity(overdue.len());
    for booking in &overdue {
        if let Some(canceled) = expire_if_overdue(conn, booking, window_minutes, at)? {
            expired.push(canceled);
        }
    }
    Ok(expired)
}

/// One pass of the background sweep. Also drops dead sessions.
pub fn run_expiry_sweep(state: &Arc<AppState>) -> AppResult<usize> {
    let at = now();
    let expired = {
        let conn = state.db()?;
        let sessions = queries::delete_expired_sessions(&conn, &at)?;
        if sessions > 0 {
            tracing::debug!(count = sessions, "expired sessions removed");
        }
        expire_overdue(&conn, state.config.payment_window_minutes, at)?
    };

    for booking in &expired {
        publish_booking_event(state, booking, EXPIRED_REASON);
    }
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "overdue bookings canceled");
    }
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Discount, DiscountKind, DiscountType, MembershipLevel, Role, Room, RoomStatus};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn alice() -> User {
        User {
            id: "alice".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            role: Role::User,
            points: 0,
            total_spending: 0,
            membership_level: MembershipLevel::Bronze,
            created_at: now(),
        }
    }

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::create_user(&conn, &alice()).unwrap();
        queries::save_room(
            &conn,
            &Room {
                id: "room-1".to_string(),
                hotel_id: None,
                name: "Twin 201".to_string(),
                room_type: "Twin".to_string(),
                maxcount: 2,
                beds: 2,
                baths: 1,
                phonenumber: None,
                rentperday: 800_000,
                description: None,
                availability_status: RoomStatus::Available,
            },
        )
        .unwrap();
        queries::save_discount(
            &conn,
            &Discount {
                id: "welcome".to_string(),
                name: "Welcome".to_string(),
                code: Some("WELCOME".to_string()),
                description: None,
                kind: DiscountKind::Voucher,
                discount_type: DiscountType::Fixed,
                discount_value: 100_000.0,
                applicable_room_ids: vec![],
                start_date: d("2025-01-01"),
                end_date: d("2025-12-31"),
                min_booking_amount: 0,
                max_discount: None,
                is_stackable: false,
                membership_level: None,
                min_spending: None,
                owner_user_id: None,
            },
        )
        .unwrap();
        conn
    }

    fn new_booking(user: Option<User>, codes: &[&str]) -> NewBooking {
        NewBooking {
            room_id: "room-1".to_string(),
            user,
            customer_name: "Alice".to_string(),
            email: "Alice@Example.com".to_string(),
            phone: Some("0900000000".to_string()),
            checkin: d("2025-06-10"),
            checkout: d("2025-06-12"),
            adults: 2,
            children: 0,
            payment_method: PaymentMethod::BankTransfer,
            voucher_codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    const TODAY: &str = "2025-06-01";

    #[test]
    fn test_create_prices_server_side() {
        let conn = setup();
        let booking = create_booking(&conn, new_booking(Some(alice()), &["welcome"]), d(TODAY)).unwrap();
        assert_eq!(booking.base_amount, 1_600_000);
        assert_eq!(booking.total_amount, 1_500_000);
        assert_eq!(booking.applied_vouchers, vec![AppliedVoucher { code: "WELCOME".to_string(), discount: 100_000 }]);
        assert_eq!(booking.email, "alice@example.com");
        assert!(booking.is_awaiting_payment());
    }

    #[test]
    fn test_create_rejects_overlap() {
        let conn = setup();
        create_booking(&conn, new_booking(None, &[]), d(TODAY)).unwrap();
        let err = create_booking(&conn, new_booking(None, &[]), d(TODAY)).unwrap_err();
        assert_eq!(err.code(), "booking_conflict");
    }

    #[test]
    fn test_confirm_records_redemption_once() {
        let mut conn = setup();
        let booking = create_booking(&conn, new_booking(Some(alice()), &["WELCOME"]), d(TODAY)).unwrap();

        let (confirmed, changed) = confirm_booking(&mut conn, &booking.id).unwrap();
        assert!(changed);
        assert!(confirmed.is_settled());
        assert!(queries::has_redeemed_discount(&conn, "welcome", Some("alice"), None).unwrap());

        let (_, changed_again) = confirm_booking(&mut conn, &booking.id).unwrap();
        assert!(!changed_again);

        // Alice already used the voucher
        let mut second = new_booking(Some(alice()), &["WELCOME"]);
        second.checkin = d("2025-07-01");
        second.checkout = d("2025-07-02");
        let err = create_booking(&conn, second, d(TODAY)).unwrap_err();
        assert_eq!(err.code(), "invalid_discount");
    }

    fn on_dates(mut booking: NewBooking, checkin: &str, checkout: &str) -> NewBooking {
        booking.checkin = d(checkin);
        booking.checkout = d(checkout);
        booking
    }

    #[test]
    fn test_voucher_on_open_booking_cannot_be_reused() {
        let conn = setup();
        let first = create_booking(&conn, new_booking(Some(alice()), &["WELCOME"]), d(TODAY)).unwrap();

        let second = on_dates(new_booking(Some(alice()), &["WELCOME"]), "2025-07-01", "2025-07-02");
        let err = create_booking(&conn, second, d(TODAY)).unwrap_err();
        assert_eq!(err.code(), "invalid_discount");
        assert!(err.to_string().contains(&first.id));

        // Canceling the first booking frees the voucher
        cancel_booking(&conn, &first.id, "").unwrap();
        let second = on_dates(new_booking(Some(alice()), &["WELCOME"]), "2025-07-01", "2025-07-02");
        assert!(create_booking(&conn, second, d(TODAY)).is_ok());
    }

    #[test]
    fn test_confirm_rejects_voucher_already_redeemed() {
        let mut conn = setup();
        let first = create_booking(&conn, new_booking(Some(alice()), &["WELCOME"]), d(TODAY)).unwrap();

        // A second pending booking priced with the same voucher
        let mut twin = first.clone();
        twin.id = "twin".to_string();
        twin.checkin = d("2025-07-01");
        twin.checkout = d("2025-07-02");
        queries::create_booking(&conn, &twin).unwrap();

        confirm_booking(&mut conn, &first.id).unwrap();
        let err = confirm_booking(&mut conn, &twin.id).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.to_string().contains("WELCOME"));

        let twin = load_booking(&conn, "twin").unwrap();
        assert!(twin.is_awaiting_payment());
        let redemptions: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM discount_redemptions WHERE discount_id = 'welcome'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(redemptions, 1);
    }

    #[test]
    fn test_guest_voucher_is_single_use_per_email() {
        let mut conn = setup();
        let first = create_booking(&conn, new_booking(None, &["WELCOME"]), d(TODAY)).unwrap();
        confirm_booking(&mut conn, &first.id).unwrap();
        assert!(queries::has_redeemed_discount(&conn, "welcome", None, Some("ALICE@example.com")).unwrap());

        let again = on_dates(new_booking(None, &["WELCOME"]), "2025-07-01", "2025-07-02");
        let err = create_booking(&conn, again, d(TODAY)).unwrap_err();
        assert!(err.to_string().contains("already been used"));

        // The account behind the same email is the same customer
        let signed_in = on_dates(new_booking(Some(alice()), &["WELCOME"]), "2025-07-01", "2025-07-02");
        assert!(create_booking(&conn, signed_in, d(TODAY)).is_err());

        let mut other = on_dates(new_booking(None, &["WELCOME"]), "2025-07-01", "2025-07-02");
        other.email = "bob@example.com".to_string();
        assert!(create_booking(&conn, other, d(TODAY)).is_ok());
    }

    #[test]
    fn test_cancel_rules() {
        let mut conn = setup();
        let pending = create_booking(&conn, new_booking(None, &[]), d(TODAY)).unwrap();
        let canceled = cancel_booking(&conn, &pending.id, "  ").unwrap();
        assert_eq!(canceled.status, BookingStatus::Canceled);
        assert_eq!(canceled.payment_status, PaymentStatus::Canceled);
        assert_eq!(canceled.cancel_reason.as_deref(), Some("canceled by customer"));

        let err = cancel_booking(&conn, &pending.id, "again").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(matches!(confirm_booking(&mut conn, &pending.id), Err(AppError::Conflict(_))));

        let paid = create_booking(&conn, new_booking(None, &[]), d(TODAY)).unwrap();
        confirm_booking(&mut conn, &paid.id).unwrap();
        let canceled = cancel_booking(&conn, &paid.id, "change of plans").unwrap();
        assert_eq!(canceled.payment_status, PaymentStatus::Paid);
        assert_eq!(canceled.cancel_reason.as_deref(), Some("change of plans"));
    }

    #[test]
    fn test_payment_deadline_and_expiry() {
        let conn = setup();
        let booking = create_booking(&conn, new_booking(None, &[]), d(TODAY)).unwrap();

        let early = payment_deadline(&booking, 15, booking.created_at + Duration::minutes(5));
        assert!(!early.expired);
        assert_eq!(early.time_remaining, 600);

        let late = booking.created_at + Duration::minutes(16);
        assert!(payment_deadline(&booking, 15, late).expired);

        let expired = expire_overdue(&conn, 15, late).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].cancel_reason.as_deref(), Some(EXPIRED_REASON));

        // The freed range can be booked again
        assert!(create_booking(&conn, new_booking(None, &[]), d(TODAY)).is_ok());
    }

    #[test]
    fn test_access_rules() {
        let conn = setup();
        let guest = create_booking(&conn, new_booking(None, &[]), d(TODAY)).unwrap();
        assert!(check_access(&guest, None).is_ok());

        let mut owned = new_booking(Some(alice()), &[]);
        owned.checkin = d("2025-08-01");
        owned.checkout = d("2025-08-03");
        let owned = create_booking(&conn, owned, d(TODAY)).unwrap();
        assert!(check_access(&owned, Some(&alice())).is_ok());
        assert!(check_access(&owned, None).is_err());

        let mut admin = alice();
        admin.id = "someone-else".to_string();
        assert!(check_access(&owned, Some(&admin)).is_err());
        admin.role = Role::Admin;
        assert!(check_access(&owned, Some(&admin)).is_ok());
    }
}
