use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub hotel_id: String,
    pub room_id: Option<String>,
    pub user_name: String,
    pub email: String,
    pub rating: i64,
    pub comment: String,
    pub is_hidden: bool,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

/// Moderation filter on review listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewVisibility {
    Active,
    Hidden,
    All,
}

impl ReviewVisibility {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ReviewVisibility::Active),
            "hidden" => Some(ReviewVisibility::Hidden),
            "all" => Some(ReviewVisibility::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    /// Mean rating rounded to one decimal; 0 with no reviews.
    pub average: f64,
    pub total_reviews: i64,
}

impl RatingSummary {
    pub fn from_totals(sum: i64, count: i64) -> Self {
        let average = if count > 0 {
            ((sum as f64 / count as f64) * 10.0).round() / 10.0
        } else {
            0.0
        };
        RatingSummary {
            average,
            total_reviews: count,
        }
    }
}
