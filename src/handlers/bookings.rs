use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::dates::{deserialize_date, now, today};
use crate::models::{Booking, BookingStatus, PaymentMethod};
use crate::services::booking::{self as booking_service, NewBooking, PaymentDeadline};
use crate::services::events::publish_booking_event;
use crate::services::loyalty::{self, AccrualOutcome};
use crate::services::{auth, scheduling};
use crate::state::AppState;

// POST /api/bookings/validate
#[derive(Deserialize)]
pub struct ValidateRequest {
    pub roomid: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub checkin: NaiveDate,
    #[serde(deserialize_with = "deserialize_date")]
    pub checkout: NaiveDate,
    #[serde(default = "one")]
    pub adults: i64,
    #[serde(default)]
    pub children: i64,
}

fn one() -> i64 {
    1
}

pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let room = queries::get_room(&db, &body.roomid)?
        .ok_or_else(|| AppError::NotFound(format!("room {}", body.roomid)))?;
    scheduling::validate_booking(&db, &room, body.checkin, body.checkout, body.adults, body.children)?;
    Ok(Json(serde_json::json!({"valid": true})))
}

// POST /api/bookings/bookroom
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRoomRequest {
    pub roomid: String,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(deserialize_with = "deserialize_date")]
    pub checkin: NaiveDate,
    #[serde(deserialize_with = "deserialize_date")]
    pub checkout: NaiveDate,
    #[serde(default = "one")]
    pub adults: i64,
    #[serde(default)]
    pub children: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub applied_vouchers: Vec<VoucherRef>,
}

/// Clients may send bare codes or `{code, discount}` objects; only the code
/// is used.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum VoucherRef {
    Code(String),
    Applied { code: String },
}

impl VoucherRef {
    fn into_code(self) -> String {
        match self {
            VoucherRef::Code(code) | VoucherRef::Applied { code } => code,
        }
    }
}

pub async fn book_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BookRoomRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let booking = {
        let db = state.db()?;
        let user = auth::optional_user(&db, &headers)?;
        let new = NewBooking {
            room_id: body.roomid,
            user,
            customer_name: body.customer_name,
            email: body.email,
            phone: body.phone,
            checkin: body.checkin,
            checkout: body.checkout,
            adults: body.adults,
            children: body.children,
            payment_method: body.payment_method,
            voucher_codes: body.applied_vouchers.into_iter().map(VoucherRef::into_code).collect(),
        };
        booking_service::create_booking(&db, new, today())?
    };
    publish_booking_event(&state, &booking, "created");

    let window = state.config.payment_window_minutes;
    let payment_result = match booking.payment_method {
        PaymentMethod::BankTransfer => {
            let bank = &state.config.bank;
            serde_json::json!({
                "bankInfo": {
                    "bankName": bank.bank_name,
                    "accountNumber": bank.account_number,
                    "accountName": bank.account_name,
                    "amount": booking.total_amount,
                    "transferContent": format!("BOOKING {}", booking.id),
                },
                "deadline": booking_service::payment_deadline(&booking, window, now()),
            })
        }
        PaymentMethod::MobilePayment | PaymentMethod::Vnpay => serde_json::json!({
            "deadline": booking_service::payment_deadline(&booking, window, now()),
        }),
        PaymentMethod::Cash | PaymentMethod::CreditCard => serde_json::Value::Null,
    };

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "booking": booking, "paymentResult": payment_result })),
    ))
}

/// Loads a booking the caller may see, canceling it first if its payment
/// window has run out.
fn visible_booking(state: &Arc<AppState>, headers: &HeaderMap, id: &str) -> AppResult<Booking> {
    let (booking, expired) = {
        let db = state.db()?;
        let user = auth::optional_user(&db, headers)?;
        let booking = booking_service::load_booking(&db, id)?;
        booking_service::check_access(&booking, user.as_ref())?;
        match booking_service::expire_if_overdue(&db, &booking, state.config.payment_window_minutes, now())? {
            Some(canceled) => (canceled, true),
            None => (booking, false),
        }
    };
    if expired {
        publish_booking_event(state, &booking, booking_service::EXPIRED_REASON);
    }
    Ok(booking)
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Booking>> {
    Ok(Json(visible_booking(&state, &headers, &id)?))
}

// GET /api/bookings/history/:userId
pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Booking>>> {
    let db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    auth::ensure_self_or_admin(&user, &user_id)?;
    Ok(Json(queries::get_bookings_for_user(&db, &user_id)?))
}

// GET /api/bookings?status&limit
#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Booking>>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s @ ("pending" | "confirmed" | "canceled")) => Some(s),
        Some(other) => return Err(AppError::BadRequest(format!("unknown status {other}"))),
        None => None,
    };
    let limit = query.limit.unwrap_or(200).clamp(1, 1000);
    Ok(Json(queries::get_all_bookings(&db, status, limit)?))
}

// GET /api/bookings/check?email&roomId
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub email: String,
    pub room_id: Option<String>,
}

pub async fn check_booking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let booking = queries::find_latest_booking_by_email(&db, query.email.trim(), query.room_id.as_deref())?;

    Ok(Json(match booking {
        Some(b) => serde_json::json!({
            "hasBooked": b.status != BookingStatus::Canceled,
            "paymentStatus": b.payment_status,
            "booking": {
                "id": b.id,
                "roomId": b.room_id,
                "status": b.status,
                "checkin": b.checkin,
                "checkout": b.checkout,
            },
        }),
        None => serde_json::json!({
            "hasBooked": false,
            "paymentStatus": null,
            "booking": null,
        }),
    }))
}

// PUT /api/bookings/:id/confirm
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<Booking>> {
    let (booking, changed) = {
        let mut db = state.db()?;
        let user = auth::require_user(&db, &headers)?;
        let booking = booking_service::load_booking(&db, &id)?;
        // Guest bookings are settled by the gateways or an admin.
        if booking.user_id.is_none() && !user.is_admin() {
            return Err(AppError::Forbidden);
        }
        booking_service::check_access(&booking, Some(&user))?;
        booking_service::confirm_booking(&mut db, &id)?
    };
    if changed {
        publish_booking_event(&state, &booking, "confirmed");
    }
    Ok(Json(booking))
}

// PUT /api/bookings/:id/cancel
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub cancel_reason: Option<String>,
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> AppResult<Json<Booking>> {
    let reason = body
        .and_then(|Json(b)| b.cancel_reason)
        .unwrap_or_default();
    let booking = {
        let db = state.db()?;
        let user = auth::optional_user(&db, &headers)?;
        let booking = booking_service::load_booking(&db, &id)?;
        booking_service::check_access(&booking, user.as_ref())?;
        booking_service::cancel_booking(&db, &id, &reason)?
    };
    publish_booking_event(&state, &booking, "canceled");
    Ok(Json(booking))
}

// GET /api/bookings/cancel-reason?bookingId
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReasonQuery {
    pub booking_id: String,
}

pub async fn cancel_reason(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CancelReasonQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let booking = visible_booking(&state, &headers, &query.booking_id)?;
    Ok(Json(serde_json::json!({
        "bookingId": booking.id,
        "status": booking.status,
        "cancelReason": booking.cancel_reason,
    })))
}

// GET /api/bookings/:id/payment-deadline
pub async fn payment_deadline(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<PaymentDeadline>> {
    let booking = visible_booking(&state, &headers, &id)?;
    let mut deadline =
        booking_service::payment_deadline(&booking, state.config.payment_window_minutes, now());
    if booking.cancel_reason.as_deref() == Some(booking_service::EXPIRED_REASON) {
        deadline.expired = true;
    }
    Ok(Json(deadline))
}

// POST /api/bookings/checkout
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub booking_id: String,
}

pub async fn checkout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CheckoutRequest>,
) -> AppResult<Json<AccrualOutcome>> {
    let mut db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    let outcome =
        loyalty::accrue_on_checkout(&mut db, &body.booking_id, &user, state.config.vnd_per_point)?;
    Ok(Json(outcome))
}
