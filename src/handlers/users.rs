use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::{MembershipAccount, MembershipLevel, Role, User};
use crate::services::auth;
use crate::state::AppState;

// POST /api/users/register
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    if body.name.trim().is_empty() || !body.email.contains('@') {
        return Err(AppError::BadRequest("A name and a valid email are required".to_string()));
    }
    if body.password.len() < 6 {
        return Err(AppError::BadRequest("Password must be at least 6 characters".to_string()));
    }

    let user = auth::new_user(&body.name, &body.email, &body.password, body.phone)?;
    {
        let db = state.db()?;
        if queries::get_user_by_email(&db, &user.email)?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        queries::create_user(&db, &user)?;
    }

    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "user": user }))))
}

// POST /api/users/login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let user = queries::get_user_by_email(&db, body.email.trim())?
        .filter(|u| auth::verify_password(&body.password, &u.password_hash));

    let Some(user) = user else {
        tracing::warn!(email = %body.email.trim(), "failed login");
        return Err(AppError::BadRequest("Invalid email or password".to_string()));
    };

    let token = auth::issue_session(&db, &user.id, state.config.session_ttl_hours)?;
    Ok(Json(serde_json::json!({ "token": token, "user": user })))
}

// POST /api/users/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let token = auth::bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let db = state.db()?;
    queries::delete_session(&db, token)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// GET /api/users/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<User>> {
    let db = state.db()?;
    Ok(Json(auth::require_user(&db, &headers)?))
}

// PUT /api/users/profile
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    let db = state.db()?;
    let mut user = auth::require_user(&db, &headers)?;

    if let Some(name) = body.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        user.name = name.to_string();
    }
    if let Some(phone) = body.phone {
        user.phone = Some(phone).filter(|p| !p.trim().is_empty());
    }
    if let Some(new_password) = body.new_password {
        let current = body.current_password.unwrap_or_default();
        if !auth::verify_password(&current, &user.password_hash) {
            return Err(AppError::BadRequest("Current password is incorrect".to_string()));
        }
        if new_password.len() < 6 {
            return Err(AppError::BadRequest("Password must be at least 6 characters".to_string()));
        }
        user.password_hash = auth::hash_password(&new_password)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))?;
    }

    queries::update_user_profile(&db, &user)?;
    Ok(Json(user))
}

// GET /api/users/allusers
pub async fn all_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<User>>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    Ok(Json(queries::list_users(&db)?))
}

// GET /api/users/points
pub async fn get_points(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    let transactions = queries::get_recent_points_transactions(&db, &user.id, 10)?;

    Ok(Json(serde_json::json!({
        "points": user.points,
        "recentTransactions": transactions,
    })))
}

fn load_account(state: &AppState, headers: &HeaderMap, user_id: &str) -> AppResult<User> {
    let db = state.db()?;
    let caller = auth::require_user(&db, headers)?;
    auth::ensure_self_or_admin(&caller, user_id)?;
    queries::get_user(&db, user_id)?.ok_or_else(|| AppError::NotFound("user".to_string()))
}

// GET /api/users/membership/level/:id
pub async fn membership_level(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user = load_account(&state, &headers, &user_id)?;
    let account = MembershipAccount {
        user_id: user.id.clone(),
        points: user.points,
        total_spending: user.total_spending,
        membership_level: user.membership_level,
    };
    let next = MembershipLevel::next_tier(user.total_spending).map(|(level, remaining)| {
        serde_json::json!({ "level": level, "remainingSpending": remaining })
    });

    Ok(Json(serde_json::json!({
        "membershipLevel": account.membership_level,
        "points": account.points,
        "totalSpending": account.total_spending,
        "account": account,
        "nextLevel": next,
    })))
}

// GET /api/users/membership/benefits/:id
pub async fn membership_benefits(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user = load_account(&state, &headers, &user_id)?;
    Ok(Json(serde_json::json!({
        "membershipLevel": user.membership_level,
        "benefits": user.membership_level.benefits(),
    })))
}

// ── Staff ──

#[derive(Deserialize)]
pub struct StaffInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: String,
}

// GET /api/users/staff
pub async fn list_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<User>>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    Ok(Json(queries::list_users_by_role(&db, Role::Staff)?))
}

// POST /api/users/staff
pub async fn create_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StaffInput>,
) -> AppResult<(StatusCode, Json<User>)> {
    if body.name.trim().is_empty() || !body.email.contains('@') {
        return Err(AppError::BadRequest("A name and a valid email are required".to_string()));
    }
    if body.password.trim().len() < 6 {
        return Err(AppError::BadRequest("Password must be at least 6 characters".to_string()));
    }

    let mut staff = auth::new_user(&body.name, &body.email, body.password.trim(), None)?;
    staff.role = Role::Staff;

    let db = state.db()?;
    let admin = auth::require_admin(&db, &headers)?;
    if queries::get_user_by_email(&db, &staff.email)?.is_some() {
        return Err(AppError::Conflict("Email is already registered".to_string()));
    }
    queries::create_user(&db, &staff)?;

    tracing::info!(staff_id = %staff.id, admin = %admin.id, "staff account created");
    Ok((StatusCode::CREATED, Json(staff)))
}

fn load_staff(conn: &rusqlite::Connection, id: &str) -> AppResult<User> {
    queries::get_user(conn, id)?
        .filter(|u| u.role == Role::Staff)
        .ok_or_else(|| AppError::NotFound(format!("staff {id}")))
}

// PUT /api/users/staff/:id
pub async fn update_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<StaffInput>,
) -> AppResult<Json<User>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    let mut staff = load_staff(&db, &id)?;

    let name = body.name.trim();
    if !name.is_empty() {
        staff.name = name.to_string();
    }
    let email = body.email.trim().to_lowercase();
    if !email.is_empty() && email != staff.email {
        if !email.contains('@') {
            return Err(AppError::BadRequest("A valid email is required".to_string()));
        }
        if queries::get_user_by_email(&db, &email)?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        staff.email = email;
    }
    // An empty password keeps the current one.
    let password = body.password.trim();
    if !password.is_empty() {
        if password.len() < 6 {
            return Err(AppError::BadRequest("Password must be at least 6 characters".to_string()));
        }
        staff.password_hash = auth::hash_password(password)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {e}")))?;
        queries::delete_user_sessions(&db, &staff.id)?;
    }

    queries::update_user_credentials(&db, &staff)?;
    tracing::info!(staff_id = %staff.id, "staff account updated");
    Ok(Json(staff))
}

// DELETE /api/users/staff/:id
/// Revokes back-office access; the account itself stays as a regular user.
pub async fn remove_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    let staff = load_staff(&db, &id)?;

    queries::set_user_role(&db, &staff.id, Role::User)?;
    queries::delete_user_sessions(&db, &staff.id)?;
    tracing::info!(staff_id = %staff.id, "staff access revoked");
    Ok(Json(serde_json::json!({ "ok": true })))
}
