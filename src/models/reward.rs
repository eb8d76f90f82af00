use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::MembershipLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub membership_level: MembershipLevel,
    pub points_required: i64,
    /// Code of the template voucher cloned on redemption.
    pub voucher_code: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRedemption {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub reward_name: String,
    pub points_spent: i64,
    pub voucher_code: String,
    pub created_at: NaiveDateTime,
}
