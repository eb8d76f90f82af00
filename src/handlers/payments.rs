use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{Booking, BookingStatus};
use crate::services::auth;
use crate::services::booking as booking_service;
use crate::services::events::publish_booking_event;
use crate::services::payments::{CallbackOutcome, PaymentGateway, PaymentOrder};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub booking_id: String,
    pub order_info: Option<String>,
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

fn payable_booking(state: &AppState, headers: &HeaderMap, booking_id: &str) -> AppResult<Booking> {
    let db = state.db()?;
    let user = auth::optional_user(&db, headers)?;
    let booking = booking_service::load_booking(&db, booking_id)?;
    booking_service::check_access(&booking, user.as_ref())?;
    if !booking.is_awaiting_payment() {
        return Err(AppError::Conflict(format!(
            "Booking is {} / {} and cannot be paid",
            booking.status.as_str(),
            booking.payment_status.as_str()
        )));
    }
    Ok(booking)
}

async fn create_payment(
    state: &AppState,
    gateway: &dyn PaymentGateway,
    headers: &HeaderMap,
    body: CreatePaymentRequest,
    return_path: &str,
    notify_path: &str,
) -> AppResult<Json<serde_json::Value>> {
    let booking = payable_booking(state, headers, &body.booking_id)?;

    let order = PaymentOrder {
        booking_id: booking.id.clone(),
        amount: booking.total_amount,
        order_info: body
            .order_info
            .filter(|i| !i.trim().is_empty())
            .unwrap_or_else(|| format!("Thanh toan dat phong {}", booking.id)),
        return_url: format!("{}{return_path}", state.config.public_url),
        notify_url: format!("{}{notify_path}", state.config.public_url),
        client_ip: client_ip(headers),
    };

    let pay_url = gateway.create_payment(&order).await.map_err(|e| {
        tracing::error!(gateway = gateway.name(), booking_id = %booking.id, error = %e, "payment creation failed");
        AppError::Gateway(format!("could not create {} payment", gateway.name()))
    })?;

    tracing::info!(gateway = gateway.name(), booking_id = %booking.id, amount = booking.total_amount, "payment created");
    Ok(Json(serde_json::json!({ "payUrl": pay_url, "bookingId": booking.id })))
}

/// Confirms the booking on a successful, amount-matching callback. Repeat
/// callbacks are no-ops. A capture that cannot settle its booking (canceled,
/// voucher already used, wrong amount) is kept in `unmatched_payments`.
fn apply_callback(state: &Arc<AppState>, gateway: &str, outcome: &CallbackOutcome) -> AppResult<Booking> {
    let (booking, changed, unmatched) = {
        let mut db = state.db()?;
        let booking = booking_service::load_booking(&db, &outcome.booking_id)?;

        let (booking, changed, unmatched) = if !outcome.success {
            tracing::warn!(gateway, booking_id = %booking.id, message = %outcome.message, "payment not completed");
            (booking, false, None)
        } else if outcome.amount != booking.total_amount {
            tracing::warn!(
                gateway,
                booking_id = %booking.id,
                paid = outcome.amount,
                expected = booking.total_amount,
                "payment amount mismatch, booking left unconfirmed"
            );
            let reason = format!("paid {} VND, expected {}", outcome.amount, booking.total_amount);
            (booking, false, Some(reason))
        } else if booking.status == BookingStatus::Canceled {
            let reason = match booking.cancel_reason.as_deref() {
                Some(booking_service::EXPIRED_REASON) => "paid after expiry".to_string(),
                _ => "paid after cancellation".to_string(),
            };
            (booking, false, Some(reason))
        } else {
            match booking_service::confirm_booking(&mut db, &booking.id) {
                Ok((confirmed, changed)) => (confirmed, changed, None),
                Err(AppError::Conflict(reason)) => (booking, false, Some(reason)),
                Err(e) => return Err(e),
            }
        };

        let unmatched = match unmatched {
            Some(reason) => {
                let recorded = queries::record_unmatched_payment(
                    &db,
                    &booking.id,
                    gateway,
                    &outcome.transaction_ref,
                    outcome.amount,
                    &reason,
                )?;
                recorded.then_some(reason)
            }
            None => None,
        };
        (booking, changed, unmatched)
    };

    if changed {
        tracing::info!(gateway, booking_id = %booking.id, transaction = %outcome.transaction_ref, "payment confirmed");
        publish_booking_event(state, &booking, "payment received");
    }
    if let Some(reason) = unmatched {
        tracing::error!(
            gateway,
            booking_id = %booking.id,
            transaction = %outcome.transaction_ref,
            amount = outcome.amount,
            reason = %reason,
            "captured payment could not settle booking"
        );
        publish_booking_event(state, &booking, &reason);
    }
    Ok(booking)
}

fn verify(gateway: &dyn PaymentGateway, params: &HashMap<String, String>) -> AppResult<CallbackOutcome> {
    gateway.verify_callback(params).map_err(|e| {
        tracing::warn!(gateway = gateway.name(), error = %e, "rejected payment callback");
        AppError::BadRequest("Invalid payment signature".to_string())
    })
}

// POST /api/momo/create-payment
pub async fn momo_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> AppResult<Json<serde_json::Value>> {
    create_payment(&state, state.momo.as_ref(), &headers, body, "/payment-success", "/api/momo/ipn").await
}

// POST /api/momo/ipn
pub async fn momo_ipn(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<StatusCode> {
    let params: HashMap<String, String> = body
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect();

    let outcome = verify(state.momo.as_ref(), &params)?;
    apply_callback(&state, "momo", &outcome)?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/vnpay/create-payment
pub async fn vnpay_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentRequest>,
) -> AppResult<Json<serde_json::Value>> {
    create_payment(&state, state.vnpay.as_ref(), &headers, body, "/api/vnpay/return", "/api/vnpay/return").await
}

// GET /api/vnpay/return
pub async fn vnpay_return(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Redirect> {
    let outcome = verify(state.vnpay.as_ref(), &params)?;
    let booking = apply_callback(&state, "vnpay", &outcome)?;

    let target = format!(
        "{}/vnpay-success?bookingId={}&success={}",
        state.config.client_url,
        booking.id,
        booking.is_settled()
    );
    Ok(Redirect::to(&target))
}
