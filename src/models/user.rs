use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: Role,
    pub points: i64,
    pub total_spending: i64,
    pub membership_level: MembershipLevel,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Back-office access: staff moderate content, admins do everything.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            _ => Role::User,
        }
    }
}

/// Tier ladder, ordered lowest first. Derived from lifetime spending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum MembershipLevel {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

const TIERS: [(MembershipLevel, i64); 5] = [
    (MembershipLevel::Bronze, 0),
    (MembershipLevel::Silver, 5_000_000),
    (MembershipLevel::Gold, 20_000_000),
    (MembershipLevel::Platinum, 50_000_000),
    (MembershipLevel::Diamond, 100_000_000),
];

impl MembershipLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipLevel::Bronze => "Bronze",
            MembershipLevel::Silver => "Silver",
            MembershipLevel::Gold => "Gold",
            MembershipLevel::Platinum => "Platinum",
            MembershipLevel::Diamond => "Diamond",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bronze" => Some(MembershipLevel::Bronze),
            "silver" => Some(MembershipLevel::Silver),
            "gold" => Some(MembershipLevel::Gold),
            "platinum" => Some(MembershipLevel::Platinum),
            "diamond" => Some(MembershipLevel::Diamond),
            _ => None,
        }
    }

    pub fn from_spending(total_spending: i64) -> Self {
        TIERS
            .iter()
            .rev()
            .find(|(_, threshold)| total_spending >= *threshold)
            .map(|(level, _)| *level)
            .unwrap_or(MembershipLevel::Bronze)
    }

    /// Spending still needed to reach the next tier, if any.
    pub fn next_tier(total_spending: i64) -> Option<(MembershipLevel, i64)> {
        TIERS
            .iter()
            .find(|(_, threshold)| total_spending < *threshold)
            .map(|(level, threshold)| (*level, threshold - total_spending))
    }

    pub fn benefits(&self) -> Vec<&'static str> {
        let mut benefits = vec!["Earn points on every paid stay"];
        if *self >= MembershipLevel::Silver {
            benefits.push("Early check-in on request");
        }
        if *self >= MembershipLevel::Gold {
            benefits.push("Free breakfast for two");
            benefits.push("Access to Gold member discounts");
        }
        if *self >= MembershipLevel::Platinum {
            benefits.push("Free room upgrade when available");
            benefits.push("Late check-out until 14:00");
        }
        if *self >= MembershipLevel::Diamond {
            benefits.push("Airport transfer included");
            benefits.push("Dedicated concierge");
        }
        benefits
    }
}
