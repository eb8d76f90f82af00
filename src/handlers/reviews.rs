use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::db::queries::{self, ReviewFilter};
use crate::errors::{AppError, AppResult};
use crate::models::dates::now;
use crate::models::{RatingSummary, Review, ReviewVisibility};
use crate::services::auth;
use crate::state::AppState;

// POST /api/reviews
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub hotel_id: String,
    pub room_id: Option<String>,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub rating: i64,
    pub comment: String,
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let db = state.db()?;
    let user = auth::optional_user(&db, &headers)?;

    // A signed-in reviewer always writes as their account.
    let email = match (&user, body.email.as_deref()) {
        (Some(user), _) => user.email.clone(),
        (None, Some(email)) if email.contains('@') => email.trim().to_lowercase(),
        (None, _) => return Err(AppError::BadRequest("A valid email is required".to_string())),
    };
    if !(1..=5).contains(&body.rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".to_string()));
    }
    let comment = body.comment.trim();
    if comment.is_empty() {
        return Err(AppError::BadRequest("comment is required".to_string()));
    }

    if queries::get_hotel(&db, &body.hotel_id)?.is_none() {
        return Err(AppError::NotFound(format!("hotel {}", body.hotel_id)));
    }
    let room_id = body.room_id.filter(|r| !r.trim().is_empty());
    if let Some(room_id) = &room_id {
        match queries::get_room(&db, room_id)? {
            Some(room) if room.hotel_id.as_deref() == Some(body.hotel_id.as_str()) => {}
            _ => return Err(AppError::NotFound(format!("room {room_id} in hotel {}", body.hotel_id))),
        }
    }

    if !queries::has_paid_stay(&db, &email, &body.hotel_id, room_id.as_deref())? {
        return Err(AppError::Denied(
            "Only guests with a paid booking at this hotel can leave a review".to_string(),
        ));
    }

    let user_name = body
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| user.as_ref().map(|u| u.name.clone()))
        .unwrap_or_else(|| "Anonymous".to_string());

    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        hotel_id: body.hotel_id,
        room_id,
        user_name,
        email,
        rating: body.rating,
        comment: comment.to_string(),
        is_hidden: false,
        is_deleted: false,
        created_at: now(),
    };
    queries::insert_review(&db, &review)?;

    tracing::info!(review_id = %review.id, hotel_id = %review.hotel_id, rating = review.rating, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

// GET /api/reviews?hotelId&roomId&status&page&limit
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReviewsQuery {
    pub hotel_id: Option<String>,
    pub room_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListReviewsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let caller = auth::optional_user(&db, &headers)?;

    let requested = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(
            ReviewVisibility::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("unknown status {s}")))?,
        ),
        None => None,
    };
    // Hidden reviews are for moderators only.
    let visibility = if caller.as_ref().is_some_and(|u| u.is_staff()) {
        requested.unwrap_or(ReviewVisibility::All)
    } else {
        ReviewVisibility::Active
    };
    let hidden = match visibility {
        ReviewVisibility::Active => Some(false),
        ReviewVisibility::Hidden => Some(true),
        ReviewVisibility::All => None,
    };

    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let filter = ReviewFilter {
        hotel_id: query.hotel_id.as_deref().filter(|s| !s.is_empty()),
        room_id: query.room_id.as_deref().filter(|s| !s.is_empty()),
        hidden,
    };
    let (reviews, total) = queries::list_reviews(&db, &filter, limit, (page - 1) * limit)?;

    Ok(Json(serde_json::json!({
        "reviews": reviews,
        "total": total,
        "page": page,
        "totalPages": ((total + limit - 1) / limit).max(1),
    })))
}

// GET /api/reviews/average?hotelId&roomId
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageQuery {
    pub hotel_id: Option<String>,
    pub room_id: Option<String>,
}

pub async fn average(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AverageQuery>,
) -> AppResult<Json<RatingSummary>> {
    let hotel_id = query.hotel_id.as_deref().filter(|s| !s.is_empty());
    let room_id = query.room_id.as_deref().filter(|s| !s.is_empty());
    if hotel_id.is_none() && room_id.is_none() {
        return Err(AppError::BadRequest("hotelId or roomId is required".to_string()));
    }
    let db = state.db()?;
    Ok(Json(queries::review_summary(&db, hotel_id, room_id)?))
}

// GET /api/reviews/by-email?email
#[derive(Deserialize)]
pub struct ByEmailQuery {
    pub email: String,
}

pub async fn by_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ByEmailQuery>,
) -> AppResult<Json<Vec<Review>>> {
    let db = state.db()?;
    let caller = auth::require_user(&db, &headers)?;
    let email = query.email.trim().to_lowercase();
    if !caller.is_staff() && caller.email != email {
        return Err(AppError::Forbidden);
    }
    Ok(Json(queries::list_reviews_by_email(&db, &email)?))
}

// PATCH /api/reviews/:id/toggle-hidden
pub async fn toggle_hidden(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let moderator = auth::require_staff(&db, &headers)?;
    let review = queries::get_review(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("review {id}")))?;

    let hidden = !review.is_hidden;
    queries::set_review_hidden(&db, &id, hidden)?;
    tracing::info!(review_id = %id, hidden, moderator = %moderator.id, "review visibility changed");

    let message = if hidden { "Review hidden" } else { "Review visible" };
    Ok(Json(serde_json::json!({
        "message": message,
        "review": Review { is_hidden: hidden, ..review },
    })))
}

// DELETE /api/reviews/:id
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let moderator = auth::require_staff(&db, &headers)?;
    if !queries::soft_delete_review(&db, &id)? {
        return Err(AppError::NotFound(format!("review {id}")));
    }
    tracing::info!(review_id = %id, moderator = %moderator.id, "review deleted");
    Ok(Json(serde_json::json!({ "message": "Review deleted" })))
}
