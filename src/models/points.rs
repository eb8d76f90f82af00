use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::MembershipLevel;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PointsTransaction {
    pub id: String,
    pub user_id: String,
    pub booking_id: String,
    pub amount: i64,
    pub points: i64,
    pub created_at: NaiveDateTime,
}

/// Per-user aggregate, stored on the user row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipAccount {
    pub user_id: String,
    pub points: i64,
    pub total_spending: i64,
    pub membership_level: MembershipLevel,
}
