use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::dates::{deserialize_date, today};
use crate::models::{Discount, DiscountKind};
use crate::services::auth;
use crate::services::pricing::{self, PriceQuote};
use crate::state::AppState;

// GET /api/discounts
pub async fn list_active(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let discounts = queries::list_active_discounts(&db, &today(), None)?;

    // Codes stay private; festival and member promotions are applied by id.
    let public: Vec<serde_json::Value> = discounts
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "name": d.name,
                "description": d.description,
                "type": d.kind,
                "discountType": d.discount_type,
                "discountValue": d.discount_value,
                "applicableRoomIds": d.applicable_room_ids,
                "startDate": d.start_date,
                "endDate": d.end_date,
                "minBookingAmount": d.min_booking_amount,
                "maxDiscount": d.max_discount,
                "isStackable": d.is_stackable,
                "membershipLevel": d.membership_level,
                "minSpending": d.min_spending,
            })
        })
        .collect();
    Ok(Json(serde_json::Value::Array(public)))
}

// GET /api/discounts/admin
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Discount>>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    Ok(Json(queries::list_discounts(&db)?))
}

fn prepare(mut discount: Discount, id: String) -> AppResult<Discount> {
    discount.id = id;
    discount.owner_user_id = None;
    discount.normalize();
    discount.validate().map_err(AppError::BadRequest)?;
    Ok(discount)
}

fn ensure_code_free(conn: &rusqlite::Connection, discount: &Discount) -> AppResult<()> {
    if let Some(code) = &discount.code {
        if let Some(existing) = queries::get_discount_by_code(conn, code)? {
            if existing.id != discount.id {
                return Err(AppError::Conflict(format!("Discount code {code} already exists")));
            }
        }
    }
    Ok(())
}

// POST /api/discounts
pub async fn create_discount(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Discount>,
) -> AppResult<(StatusCode, Json<Discount>)> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    let discount = prepare(body, uuid::Uuid::new_v4().to_string())?;
    ensure_code_free(&db, &discount)?;
    queries::save_discount(&db, &discount)?;
    tracing::info!(discount_id = %discount.id, kind = discount.kind.as_str(), "discount created");
    Ok((StatusCode::CREATED, Json(discount)))
}

// PUT /api/discounts/:id
pub async fn update_discount(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Discount>,
) -> AppResult<Json<Discount>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if queries::get_discount(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("discount {id}")));
    }
    let discount = prepare(body, id)?;
    ensure_code_free(&db, &discount)?;
    queries::save_discount(&db, &discount)?;
    Ok(Json(discount))
}

// DELETE /api/discounts/:id
pub async fn delete_discount(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if !queries::delete_discount(&db, &id)? {
        return Err(AppError::NotFound(format!("discount {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/discounts/apply
#[derive(Deserialize)]
pub struct ApplyRequest {
    #[serde(rename = "bookingData")]
    pub booking_data: BookingData,
    #[serde(default)]
    pub identifiers: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingData {
    pub roomid: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub checkin: NaiveDate,
    #[serde(deserialize_with = "deserialize_date")]
    pub checkout: NaiveDate,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

pub async fn apply_discounts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ApplyRequest>,
) -> AppResult<Json<PriceQuote>> {
    let db = state.db()?;
    let data = body.booking_data;

    // A bearer token beats a userId in the body.
    let user = match auth::optional_user(&db, &headers)? {
        Some(user) => Some(user),
        None => match data.user_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => queries::get_user(&db, id)?,
            None => None,
        },
    };

    let room = queries::get_room(&db, &data.roomid)?
        .ok_or_else(|| AppError::NotFound(format!("room {}", data.roomid)))?;

    let email = data.email.as_deref().or(user.as_ref().map(|u| u.email.as_str()));
    let quote = pricing::quote(
        &db,
        &room,
        data.checkin,
        data.checkout,
        today(),
        user.as_ref(),
        email,
        &body.identifiers,
    )?;
    Ok(Json(quote))
}

// GET /api/discounts/accumulated
pub async fn accumulated(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    let discounts = queries::list_active_discounts(&db, &today(), Some(DiscountKind::Accumulated))?;

    let listed: Vec<serde_json::Value> = discounts
        .into_iter()
        .map(|d| {
            let required = d.min_spending.unwrap_or(0);
            serde_json::json!({
                "eligible": user.total_spending >= required,
                "remainingSpending": (required - user.total_spending).max(0),
                "discount": d,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "discounts": listed,
        "totalSpending": user.total_spending,
    })))
}
