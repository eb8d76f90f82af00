use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::dates::today;
use crate::models::{MembershipLevel, Reward};
use crate::services::auth;
use crate::services::loyalty::{self, RedeemOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardInput {
    pub name: String,
    pub description: Option<String>,
    pub membership_level: MembershipLevel,
    pub points_required: i64,
    pub voucher_code: String,
    #[serde(default = "active_default")]
    pub active: bool,
}

fn active_default() -> bool {
    true
}

impl RewardInput {
    fn into_reward(self, conn: &rusqlite::Connection, id: String) -> AppResult<Reward> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name is required".to_string()));
        }
        if self.points_required <= 0 {
            return Err(AppError::BadRequest("pointsRequired must be greater than 0".to_string()));
        }
        let code = self.voucher_code.trim().to_uppercase();
        match queries::get_discount_by_code(conn, &code)? {
            Some(template) if template.owner_user_id.is_none() => {}
            _ => {
                return Err(AppError::BadRequest(format!(
                    "voucherCode {code} does not match a voucher discount"
                )))
            }
        }
        Ok(Reward {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            membership_level: self.membership_level,
            points_required: self.points_required,
            voucher_code: code,
            active: self.active,
        })
    }
}

// GET /api/rewards
pub async fn list_rewards(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let user = auth::optional_user(&db, &headers)?;
    let rewards = queries::list_rewards(&db, true)?;

    let listed: Vec<serde_json::Value> = rewards
        .into_iter()
        .map(|r| {
            let eligible = user.as_ref().is_some_and(|u| {
                u.membership_level >= r.membership_level && u.points >= r.points_required
            });
            let mut value = serde_json::to_value(&r).unwrap_or_default();
            value["eligible"] = serde_json::Value::Bool(eligible);
            value
        })
        .collect();

    Ok(Json(serde_json::json!({
        "rewards": listed,
        "points": user.as_ref().map(|u| u.points),
        "membershipLevel": user.as_ref().map(|u| u.membership_level),
    })))
}

// GET /api/rewards/admin
pub async fn admin_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Reward>>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    Ok(Json(queries::list_rewards(&db, false)?))
}

// POST /api/rewards/admin
pub async fn create_reward(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RewardInput>,
) -> AppResult<(StatusCode, Json<Reward>)> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    let reward = body.into_reward(&db, uuid::Uuid::new_v4().to_string())?;
    queries::save_reward(&db, &reward)?;
    tracing::info!(reward_id = %reward.id, "reward created");
    Ok((StatusCode::CREATED, Json(reward)))
}

// PUT /api/rewards/:id
pub async fn update_reward(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RewardInput>,
) -> AppResult<Json<Reward>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if queries::get_reward(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("reward {id}")));
    }
    let reward = body.into_reward(&db, id)?;
    queries::save_reward(&db, &reward)?;
    Ok(Json(reward))
}

// DELETE /api/rewards/:id
pub async fn delete_reward(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    auth::require_admin(&db, &headers)?;
    if !queries::delete_reward(&db, &id)? {
        return Err(AppError::NotFound(format!("reward {id}")));
    }
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/rewards/redeem
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub reward_id: String,
}

pub async fn redeem(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RedeemRequest>,
) -> AppResult<Json<RedeemOutcome>> {
    let mut db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    let outcome = loyalty::redeem_reward(&mut db, &user.id, &body.reward_id, today())?;
    Ok(Json(outcome))
}

// GET /api/rewards/history
pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    let redemptions = queries::list_reward_redemptions(&db, &user.id)?;
    Ok(Json(serde_json::json!({ "redemptions": redemptions })))
}

// GET /api/rewards/vouchers
pub async fn vouchers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let db = state.db()?;
    let user = auth::require_user(&db, &headers)?;
    let day = today();

    let vouchers: Vec<serde_json::Value> = queries::list_user_vouchers(&db, &user.id)?
        .into_iter()
        .map(|(voucher, used)| {
            serde_json::json!({
                "used": used,
                "expired": voucher.end_date < day,
                "voucher": voucher,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "vouchers": vouchers })))
}
