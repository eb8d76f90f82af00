use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{Hotel, Room, RoomStatus};
use crate::services::auth;
use crate::state::AppState;

// ── Hotels ──

#[derive(Deserialize)]
pub struct HotelInput {
    pub name: String,
    pub address: String,
    pub region: Option<String>,
    pub description: Option<String>,
}

impl HotelInput {
    fn into_hotel(self, id: String) -> AppResult<Hotel> {
        if self.name.trim().is_empty() || self.address.trim().is_empty() {
            return Err(AppError::BadRequest("name and address are required".to_string()));
        }
        Ok(Hotel {
            id,
            name: self.name.trim().to_string(),
            address: self.address.trim().to_string(),
            region: self.region,
            description: self.description,
        })
    }
}

// GET /api/hotels
pub async fn list_hotels(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Hotel>>> {
    let db = state.db()?;
    Ok(Json(queries::list_hotels(&db)?))
}

// POST /api/hotels
pub async fn create_hotel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<HotelInput>,
) -> AppResult<(StatusCode, Json<Hotel>)> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    let hotel = body.into_hotel(uuid::Uuid::new_v4().to_string())?;
    queries::save_hotel(&db, &hotel)?;
    Ok((StatusCode::CREATED, Json(hotel)))
}

// PUT /api/hotels/:id
pub async fn update_hotel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<HotelInput>,
) -> AppResult<Json<Hotel>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if queries::get_hotel(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("hotel {id}")));
    }
    let hotel = body.into_hotel(id)?;
    queries::save_hotel(&db, &hotel)?;
    Ok(Json(hotel))
}

// DELETE /api/hotels/:id
pub async fn delete_hotel(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if !queries::delete_hotel(&db, &id)? {
        return Err(AppError::NotFound(format!("hotel {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

// GET /api/hotels/:id/rooms
pub async fn hotel_rooms(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let hotel = queries::get_hotel(&db, &id)?.ok_or_else(|| AppError::NotFound(format!("hotel {id}")))?;
    let rooms = queries::list_rooms(&db, Some(&hotel.id))?;
    Ok(Json(serde_json::json!({ "hotel": hotel, "rooms": rooms })))
}

// ── Rooms ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInput {
    pub hotel_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub maxcount: i64,
    #[serde(default = "one")]
    pub beds: i64,
    #[serde(default = "one")]
    pub baths: i64,
    pub phonenumber: Option<String>,
    pub rentperday: i64,
    pub description: Option<String>,
    pub availability_status: Option<RoomStatus>,
}

fn one() -> i64 {
    1
}

impl RoomInput {
    fn into_room(self, id: String) -> AppResult<Room> {
        if self.name.trim().is_empty() || self.room_type.trim().is_empty() {
            return Err(AppError::BadRequest("name and type are required".to_string()));
        }
        if self.maxcount < 1 {
            return Err(AppError::BadRequest("maxcount must be at least 1".to_string()));
        }
        if self.rentperday <= 0 {
            return Err(AppError::BadRequest("rentperday must be greater than 0".to_string()));
        }
        Ok(Room {
            id,
            hotel_id: self.hotel_id.filter(|h| !h.is_empty()),
            name: self.name.trim().to_string(),
            room_type: self.room_type.trim().to_string(),
            maxcount: self.maxcount,
            beds: self.beds.max(0),
            baths: self.baths.max(0),
            phonenumber: self.phonenumber,
            rentperday: self.rentperday,
            description: self.description,
            availability_status: self.availability_status.unwrap_or(RoomStatus::Available),
        })
    }
}

fn ensure_hotel_exists(conn: &rusqlite::Connection, room: &Room) -> AppResult<()> {
    if let Some(hotel_id) = &room.hotel_id {
        if queries::get_hotel(conn, hotel_id)?.is_none() {
            return Err(AppError::BadRequest(format!("hotel {hotel_id} does not exist")));
        }
    }
    Ok(())
}

// GET /api/rooms/getallrooms
pub async fn all_rooms(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Room>>> {
    let db = state.db()?;
    Ok(Json(queries::list_rooms(&db, None)?))
}

// POST /api/rooms/getroombyid
#[derive(Deserialize)]
pub struct RoomIdRequest {
    pub roomid: String,
}

pub async fn room_by_id(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RoomIdRequest>,
) -> AppResult<Json<Room>> {
    let db = state.db()?;
    let room = queries::get_room(&db, &body.roomid)?
        .ok_or_else(|| AppError::NotFound(format!("room {}", body.roomid)))?;
    Ok(Json(room))
}

// GET /api/rooms/suggestions?roomId&roomType
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionQuery {
    pub room_id: Option<String>,
    pub room_type: Option<String>,
}

pub async fn room_suggestions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuggestionQuery>,
) -> AppResult<Json<Vec<Room>>> {
    let db = state.db()?;
    let room_type = match (query.room_type, &query.room_id) {
        (Some(t), _) if !t.trim().is_empty() => t,
        (_, Some(room_id)) => {
            queries::get_room(&db, room_id)?
                .ok_or_else(|| AppError::NotFound(format!("room {room_id}")))?
                .room_type
        }
        _ => return Err(AppError::BadRequest("roomId or roomType is required".to_string())),
    };
    let rooms = queries::find_room_suggestions(&db, &room_type, query.room_id.as_deref().unwrap_or(""), 5)?;
    Ok(Json(rooms))
}

// POST /api/rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RoomInput>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    let room = body.into_room(uuid::Uuid::new_v4().to_string())?;
    ensure_hotel_exists(&db, &room)?;
    queries::save_room(&db, &room)?;
    tracing::info!(room_id = %room.id, "room created");
    Ok((StatusCode::CREATED, Json(room)))
}

// PUT /api/rooms/:id
pub async fn update_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RoomInput>,
) -> AppResult<Json<Room>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if queries::get_room(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("room {id}")));
    }
    let room = body.into_room(id)?;
    ensure_hotel_exists(&db, &room)?;
    queries::save_room(&db, &room)?;
    Ok(Json(room))
}

// DELETE /api/rooms/:id
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if queries::room_has_bookings(&db, &id)? {
        return Err(AppError::Conflict(
            "This room has bookings; set it to maintenance instead of deleting it".to_string(),
        ));
    }
    if !queries::delete_room(&db, &id)? {
        return Err(AppError::NotFound(format!("room {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}
