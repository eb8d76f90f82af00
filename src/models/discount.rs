use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MembershipLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(default)]
    pub applicable_room_ids: Vec<String>,
    #[serde(deserialize_with = "super::dates::deserialize_date")]
    pub start_date: NaiveDate,
    #[serde(deserialize_with = "super::dates::deserialize_date")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub min_booking_amount: i64,
    pub max_discount: Option<i64>,
    #[serde(default)]
    pub is_stackable: bool,
    pub membership_level: Option<MembershipLevel>,
    pub min_spending: Option<i64>,
    pub owner_user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Voucher,
    Festival,
    Member,
    Accumulated,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Voucher => "voucher",
            DiscountKind::Festival => "festival",
            DiscountKind::Member => "member",
            DiscountKind::Accumulated => "accumulated",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "festival" => DiscountKind::Festival,
            "member" => DiscountKind::Member,
            "accumulated" => DiscountKind::Accumulated,
            _ => DiscountKind::Voucher,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fixed" => DiscountType::Fixed,
            _ => DiscountType::Percentage,
        }
    }
}

impl Discount {
    /// Checks the per-type field invariants. Returns the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.discount_value.is_nan() || self.discount_value <= 0.0 {
            return Err("discountValue must be greater than 0".to_string());
        }
        if self.discount_type == DiscountType::Percentage && self.discount_value > 100.0 {
            return Err("percentage discountValue cannot exceed 100".to_string());
        }
        if self.start_date >= self.end_date {
            return Err("endDate must be after startDate".to_string());
        }
        if self.min_booking_amount < 0 {
            return Err("minBookingAmount cannot be negative".to_string());
        }
        if matches!(self.max_discount, Some(cap) if cap <= 0) {
            return Err("maxDiscount must be greater than 0".to_string());
        }

        let has_code = self.code.as_deref().is_some_and(|c| !c.trim().is_empty());
        match self.kind {
            DiscountKind::Voucher if !has_code => {
                return Err("code is required for voucher discounts".to_string());
            }
            DiscountKind::Member if self.membership_level.is_none() => {
                return Err("membershipLevel is required for member discounts".to_string());
            }
            DiscountKind::Accumulated if !matches!(self.min_spending, Some(v) if v > 0) => {
                return Err(
                    "minSpending must be greater than 0 for accumulated discounts".to_string(),
                );
            }
            _ => {}
        }
        Ok(())
    }

    /// Drops the fields that carry no meaning for this discount's type.
    pub fn normalize(&mut self) {
        if let Some(code) = &self.code {
            let trimmed = code.trim().to_uppercase();
            self.code = if trimmed.is_empty() { None } else { Some(trimmed) };
        }
        if self.kind != DiscountKind::Member {
            self.membership_level = None;
        }
        if self.kind != DiscountKind::Accumulated {
            self.min_spending = None;
        }
    }

    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    pub fn applies_to_room(&self, room_id: &str) -> bool {
        self.applicable_room_ids.is_empty() || self.applicable_room_ids.iter().any(|r| r == room_id)
    }

    /// Uncapped-by-balance reduction against the pre-discount base.
    pub fn raw_reduction(&self, base: i64) -> i64 {
        match self.discount_type {
            DiscountType::Percentage => {
                let amount = (base as f64 * self.discount_value / 100.0).round() as i64;
                match self.max_discount {
                    Some(cap) => amount.min(cap),
                    None => amount,
                }
            }
            DiscountType::Fixed => self.discount_value.round() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn voucher() -> Discount {
        Discount {
            id: "d1".to_string(),
            name: "Summer".to_string(),
            code: Some("summer10".to_string()),
            description: None,
            kind: DiscountKind::Voucher,
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            applicable_room_ids: vec![],
            start_date: date("2025-06-01"),
            end_date: date("2025-08-31"),
            min_booking_amount: 0,
            max_discount: None,
            is_stackable: true,
            membership_level: None,
            min_spending: None,
            owner_user_id: None,
        }
    }

    #[test]
    fn test_voucher_requires_code() {
        let mut d = voucher();
        d.code = None;
        assert!(d.validate().unwrap_err().contains("code"));
    }

    #[test]
    fn test_member_requires_level() {
        let mut d = voucher();
        d.kind = DiscountKind::Member;
        assert!(d.validate().unwrap_err().contains("membershipLevel"));
        d.membership_level = Some(MembershipLevel::Gold);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_accumulated_requires_positive_spending() {
        let mut d = voucher();
        d.kind = DiscountKind::Accumulated;
        d.min_spending = Some(0);
        assert!(d.validate().is_err());
        d.min_spending = Some(1_000_000);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_dates_must_be_ordered() {
        let mut d = voucher();
        d.end_date = d.start_date;
        assert!(d.validate().unwrap_err().contains("endDate"));
    }

    #[test]
    fn test_normalize_uppercases_code_and_drops_foreign_fields() {
        let mut d = voucher();
        d.membership_level = Some(MembershipLevel::Gold);
        d.min_spending = Some(10);
        d.normalize();
        assert_eq!(d.code.as_deref(), Some("SUMMER10"));
        assert!(d.membership_level.is_none());
        assert!(d.min_spending.is_none());
    }

    #[test]
    fn test_window_is_inclusive() {
        let d = voucher();
        assert!(d.is_active_on(date("2025-06-01")));
        assert!(d.is_active_on(date("2025-08-31")));
        assert!(!d.is_active_on(date("2025-09-01")));
    }

    #[test]
    fn test_percentage_cap() {
        let mut d = voucher();
        d.discount_value = 50.0;
        d.max_discount = Some(200_000);
        assert_eq!(d.raw_reduction(1_000_000), 200_000);
        d.max_discount = None;
        assert_eq!(d.raw_reduction(1_000_000), 500_000);
    }
}
