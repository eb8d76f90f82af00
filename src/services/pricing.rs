//! Discount resolution and price quotes.
//!
//! A quote is a dry run: nothing is redeemed here. Voucher redemptions are
//! written when a booking is confirmed. A voucher is single use per customer,
//! where the customer is the account when signed in and the booking email
//! otherwise; a voucher already carried by another booking awaiting payment
//! counts as taken.

use axum::http::StatusCode;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::{Discount, DiscountKind, MembershipLevel, Room, User};
use crate::services::scheduling::check_dates;

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Check-out date must be after check-in date")]
    InvalidDates,

    #[error("Invalid discount \"{identifier}\": {reason}")]
    InvalidDiscount { identifier: String, reason: String },

    #[error("Discount \"{name}\" cannot be combined with other discounts")]
    NotStackable { name: String },

    #[error(
        "Discount \"{identifier}\" requires {} membership (your level: {})",
        required.as_str(),
        current.map(|l| l.as_str()).unwrap_or("none")
    )]
    MembershipRequired {
        identifier: String,
        required: MembershipLevel,
        current: Option<MembershipLevel>,
    },

    #[error(
        "Discount \"{identifier}\" requires total spending of {required} VND; you need {shortfall} VND more"
    )]
    SpendingThreshold {
        identifier: String,
        required: i64,
        current: i64,
        shortfall: i64,
    },

    #[error("failed to load discounts: {0}")]
    Lookup(String),
}

impl PricingError {
    pub fn code(&self) -> &'static str {
        match self {
            PricingError::InvalidDates => "invalid_booking_dates",
            PricingError::InvalidDiscount { .. } => "invalid_discount",
            PricingError::NotStackable { .. } => "discount_conflict",
            PricingError::MembershipRequired { .. } => "membership_required",
            PricingError::SpendingThreshold { .. } => "spending_threshold",
            PricingError::Lookup(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PricingError::InvalidDates | PricingError::InvalidDiscount { .. } => {
                StatusCode::BAD_REQUEST
            }
            PricingError::NotStackable { .. } => StatusCode::CONFLICT,
            PricingError::MembershipRequired { .. } | PricingError::SpendingThreshold { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PricingError::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn invalid(identifier: &str, reason: impl Into<String>) -> Self {
        PricingError::InvalidDiscount {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub discount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub nights: i64,
    pub base_amount: i64,
    pub applied_discounts: Vec<AppliedDiscount>,
    pub total_amount: i64,
}

impl PriceQuote {
    pub fn total_discount(&self) -> i64 {
        self.applied_discounts.iter().map(|d| d.discount).sum()
    }
}

/// A discount looked up from one caller-supplied identifier.
#[derive(Debug, Clone)]
pub struct ResolvedDiscount {
    pub identifier: String,
    pub discount: Discount,
    pub already_redeemed: bool,
    /// Another booking awaiting payment that already carries this voucher.
    pub held_by: Option<String>,
}

/// Looks up each identifier by code first, then by id. Unknown identifiers,
/// duplicates and other users' personal vouchers are rejected here.
/// `email` is the booking email, used to match guest redemptions.
pub fn resolve_discounts(
    conn: &Connection,
    identifiers: &[String],
    user: Option<&User>,
    email: Option<&str>,
) -> Result<Vec<ResolvedDiscount>, PricingError> {
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    let user_id = user.map(|u| u.id.as_str());

    let mut resolved: Vec<ResolvedDiscount> = Vec::with_capacity(identifiers.len());

    for raw in identifiers {
        let identifier = raw.trim();
        if identifier.is_empty() {
            continue;
        }

        let discount = match queries::get_discount_by_code(conn, identifier)
            .map_err(|e| PricingError::Lookup(e.to_string()))?
        {
            Some(d) => Some(d),
            None => queries::get_discount(conn, identifier)
                .map_err(|e| PricingError::Lookup(e.to_string()))?,
        };
        let Some(discount) = discount else {
            return Err(PricingError::invalid(identifier, "code does not exist"));
        };

        if resolved.iter().any(|r| r.discount.id == discount.id) {
            return Err(PricingError::invalid(identifier, "listed more than once"));
        }

        if let Some(owner) = &discount.owner_user_id {
            if user.map(|u| &u.id) != Some(owner) {
                return Err(PricingError::invalid(identifier, "voucher belongs to another account"));
            }
        }

        let (already_redeemed, held_by) =
            if discount.kind == DiscountKind::Voucher && (user_id.is_some() || email.is_some()) {
                let redeemed = queries::has_redeemed_discount(conn, &discount.id, user_id, email)
                    .map_err(|e| PricingError::Lookup(e.to_string()))?;
                let code = discount.code.as_deref().unwrap_or(&discount.id);
                let held = queries::find_open_booking_with_voucher(conn, code, user_id, email, None)
                    .map_err(|e| PricingError::Lookup(e.to_string()))?;
                (redeemed, held)
            } else {
                (false, None)
            };

        resolved.push(ResolvedDiscount {
            identifier: identifier.to_string(),
            discount,
            already_redeemed,
            held_by,
        });
    }

    Ok(resolved)
}

/// Checks eligibility of every resolved discount, then applies them in the
/// order given. Percentages are taken from the original base; every
/// reduction is capped at whatever balance is left.
pub fn price_booking(
    room: &Room,
    checkin: NaiveDate,
    checkout: NaiveDate,
    today: NaiveDate,
    user: Option<&User>,
    discounts: &[ResolvedDiscount],
) -> Result<PriceQuote, PricingError> {
    let nights = check_dates(checkin, checkout).map_err(|_| PricingError::InvalidDates)?;
    let base = room.rentperday.saturating_mul(nights).max(0);

    for resolved in discounts {
        check_eligibility(resolved, room, base, today, user)?;
    }

    if discounts.len() > 1 {
        if let Some(exclusive) = discounts.iter().find(|r| !r.discount.is_stackable) {
            return Err(PricingError::NotStackable {
                name: exclusive.discount.name.clone(),
            });
        }
    }

    let mut remaining = base;
    let mut applied = Vec::with_capacity(discounts.len());
    for resolved in discounts {
        let reduction = resolved.discount.raw_reduction(base).clamp(0, remaining);
        remaining -= reduction;
        applied.push(AppliedDiscount {
            id: resolved.discount.id.clone(),
            code: resolved.discount.code.clone(),
            name: resolved.discount.name.clone(),
            discount: reduction,
        });
    }

    Ok(PriceQuote {
        nights,
        base_amount: base,
        applied_discounts: applied,
        total_amount: remaining.max(0),
    })
}

fn check_eligibility(
    resolved: &ResolvedDiscount,
    room: &Room,
    base: i64,
    today: NaiveDate,
    user: Option<&User>,
) -> Result<(), PricingError> {
    let d = &resolved.discount;
    let id = resolved.identifier.as_str();

    if !d.is_active_on(today) {
        return Err(PricingError::invalid(
            id,
            format!("only valid from {} to {}", d.start_date, d.end_date),
        ));
    }
    if !d.applies_to_room(&room.id) {
        return Err(PricingError::invalid(id, "not applicable to this room"));
    }
    if base < d.min_booking_amount {
        return Err(PricingError::invalid(
            id,
            format!("requires a minimum booking amount of {} VND", d.min_booking_amount),
        ));
    }
    if resolved.already_redeemed {
        return Err(PricingError::invalid(id, "voucher has already been used"));
    }
    if let Some(booking_id) = &resolved.held_by {
        return Err(PricingError::invalid(
            id,
            format!("voucher is already applied to booking {booking_id}, which is awaiting payment"),
        ));
    }

    match d.kind {
        DiscountKind::Member => {
            let required = d.membership_level.unwrap_or(MembershipLevel::Bronze);
            let current = user.map(|u| u.membership_level);
            if current.map_or(true, |level| level < required) {
                return Err(PricingError::MembershipRequired {
                    identifier: id.to_string(),
                    required,
                    current,
                });
            }
        }
        DiscountKind::Accumulated => {
            let required = d.min_spending.unwrap_or(0);
            let current = user.map(|u| u.total_spending).unwrap_or(0);
            if user.is_none() || current < required {
                return Err(PricingError::SpendingThreshold {
                    identifier: id.to_string(),
                    required,
                    current,
                    shortfall: (required - current).max(0),
                });
            }
        }
        DiscountKind::Voucher | DiscountKind::Festival => {}
    }

    Ok(())
}

/// Resolve then price, the whole of a discount application request.
pub fn quote(
    conn: &Connection,
    room: &Room,
    checkin: NaiveDate,
    checkout: NaiveDate,
    today: NaiveDate,
    user: Option<&User>,
    email: Option<&str>,
    identifiers: &[String],
) -> Result<PriceQuote, PricingError> {
    let resolved = resolve_discounts(conn, identifiers, user, email)?;
    price_booking(room, checkin, checkout, today, user, &resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{DiscountType, Role, RoomStatus};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn room() -> Room {
        Room {
            id: "room-1".to_string(),
            hotel_id: None,
            name: "Deluxe 101".to_string(),
            room_type: "Deluxe".to_string(),
            maxcount: 2,
            beds: 1,
            baths: 1,
            phonenumber: None,
            rentperday: 1_000_000,
            description: None,
            availability_status: RoomStatus::Available,
        }
    }

    fn user(level: MembershipLevel, spending: i64) -> User {
        User {
            id: "user-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            role: Role::User,
            points: 0,
            total_spending: spending,
            membership_level: level,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    fn discount(id: &str, discount_type: DiscountType, value: f64, stackable: bool) -> Discount {
        Discount {
            id: id.to_string(),
            name: format!("Promo {id}"),
            code: Some(id.to_uppercase()),
            description: None,
            kind: DiscountKind::Voucher,
            discount_type,
            discount_value: value,
            applicable_room_ids: vec![],
            start_date: d("2025-01-01"),
            end_date: d("2025-12-31"),
            min_booking_amount: 0,
            max_discount: None,
            is_stackable: stackable,
            membership_level: None,
            min_spending: None,
            owner_user_id: None,
        }
    }

    fn resolved(discount: Discount) -> ResolvedDiscount {
        ResolvedDiscount {
            identifier: discount.code.clone().unwrap_or_else(|| discount.id.clone()),
            discount,
            already_redeemed: false,
            held_by: None,
        }
    }

    const TODAY: &str = "2025-06-01";

    fn price(discounts: Vec<Discount>, u: Option<&User>) -> Result<PriceQuote, PricingError> {
        let resolved: Vec<_> = discounts.into_iter().map(resolved).collect();
        price_booking(&room(), d("2025-06-10"), d("2025-06-13"), d(TODAY), u, &resolved)
    }

    #[test]
    fn test_no_discounts_is_rent_times_nights() {
        let quote = price(vec![], None).unwrap();
        assert_eq!(quote.nights, 3);
        assert_eq!(quote.base_amount, 3_000_000);
        assert_eq!(quote.total_amount, 3_000_000);
        assert!(quote.applied_discounts.is_empty());
    }

    #[test]
    fn test_percentage_discount() {
        let quote = price(vec![discount("p10", DiscountType::Percentage, 10.0, false)], None).unwrap();
        assert_eq!(quote.applied_discounts[0].discount, 300_000);
        assert_eq!(quote.total_amount, 2_700_000);
    }

    #[test]
    fn test_percentage_honors_max_discount() {
        let mut p = discount("p50", DiscountType::Percentage, 50.0, false);
        p.max_discount = Some(400_000);
        let quote = price(vec![p], None).unwrap();
        assert_eq!(quote.applied_discounts[0].discount, 400_000);
        assert_eq!(quote.total_amount, 2_600_000);
    }

    #[test]
    fn test_fixed_discount_capped_at_balance() {
        let quote = price(vec![discount("f", DiscountType::Fixed, 9_000_000.0, false)], None).unwrap();
        assert_eq!(quote.applied_discounts[0].discount, 3_000_000);
        assert_eq!(quote.total_amount, 0);
    }

    #[test]
    fn test_stacking_applies_in_order_against_remaining_balance() {
        let fixed = discount("f", DiscountType::Fixed, 2_500_000.0, true);
        let pct = discount("p", DiscountType::Percentage, 20.0, true);
        let quote = price(vec![fixed, pct], None).unwrap();
        // 20% of the 3,000,000 base is 600,000 but only 500,000 is left
        assert_eq!(quote.applied_discounts[0].discount, 2_500_000);
        assert_eq!(quote.applied_discounts[1].discount, 500_000);
        assert_eq!(quote.total_amount, 0);
        assert_eq!(quote.total_discount(), quote.base_amount);
    }

    #[test]
    fn test_total_never_negative() {
        let many = (0..5)
            .map(|i| discount(&format!("f{i}"), DiscountType::Fixed, 1_000_000.0, true))
            .collect();
        let quote = price(many, None).unwrap();
        assert_eq!(quote.total_amount, 0);
        assert!(quote.applied_discounts.iter().all(|a| a.discount >= 0));
    }

    #[test]
    fn test_non_stackable_cannot_combine() {
        let exclusive = discount("solo", DiscountType::Percentage, 10.0, false);
        let other = discount("other", DiscountType::Fixed, 10_000.0, true);
        let err = price(vec![other, exclusive], None).unwrap_err();
        assert!(matches!(err, PricingError::NotStackable { .. }));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_non_stackable_alone_is_fine() {
        let exclusive = discount("solo", DiscountType::Percentage, 10.0, false);
        assert!(price(vec![exclusive], None).is_ok());
    }

    #[test]
    fn test_expired_discount_rejected() {
        let mut old = discount("old", DiscountType::Fixed, 10_000.0, true);
        old.start_date = d("2024-01-01");
        old.end_date = d("2024-12-31");
        let err = price(vec![old], None).unwrap_err();
        assert_eq!(err.code(), "invalid_discount");
    }

    #[test]
    fn test_not_yet_started_discount_rejected() {
        let mut future = discount("future", DiscountType::Fixed, 10_000.0, true);
        future.start_date = d("2025-07-01");
        assert!(matches!(
            price(vec![future], None).unwrap_err(),
            PricingError::InvalidDiscount { .. }
        ));
    }

    #[test]
    fn test_room_restriction() {
        let mut other_room = discount("r", DiscountType::Fixed, 10_000.0, true);
        other_room.applicable_room_ids = vec!["room-2".to_string()];
        assert!(price(vec![other_room.clone()], None).is_err());
        other_room.applicable_room_ids.push("room-1".to_string());
        assert!(price(vec![other_room], None).is_ok());
    }

    #[test]
    fn test_min_booking_amount() {
        let mut big = discount("big", DiscountType::Fixed, 10_000.0, true);
        big.min_booking_amount = 5_000_000;
        let err = price(vec![big], None).unwrap_err();
        assert!(err.to_string().contains("5000000"));
    }

    #[test]
    fn test_member_discount_requires_level() {
        let mut gold = discount("gold", DiscountType::Percentage, 15.0, false);
        gold.kind = DiscountKind::Member;
        gold.membership_level = Some(MembershipLevel::Gold);

        let silver = user(MembershipLevel::Silver, 6_000_000);
        let err = price(vec![gold.clone()], Some(&silver)).unwrap_err();
        assert_eq!(err.code(), "membership_required");
        assert!(err.to_string().contains("Gold"));
        assert!(err.to_string().contains("Silver"));

        let anonymous = price(vec![gold.clone()], None).unwrap_err();
        assert_eq!(anonymous.code(), "membership_required");

        let diamond = user(MembershipLevel::Diamond, 200_000_000);
        assert!(price(vec![gold], Some(&diamond)).is_ok());
    }

    #[test]
    fn test_accumulated_discount_reports_shortfall() {
        let mut acc = discount("acc", DiscountType::Fixed, 100_000.0, true);
        acc.kind = DiscountKind::Accumulated;
        acc.min_spending = Some(10_000_000);

        let spender = user(MembershipLevel::Silver, 7_500_000);
        match price(vec![acc.clone()], Some(&spender)).unwrap_err() {
            PricingError::SpendingThreshold { shortfall, .. } => assert_eq!(shortfall, 2_500_000),
            other => panic!("unexpected error: {other}"),
        }

        let big_spender = user(MembershipLevel::Gold, 10_000_000);
        assert!(price(vec![acc], Some(&big_spender)).is_ok());
    }

    #[test]
    fn test_redeemed_voucher_rejected() {
        let mut r = resolved(discount("once", DiscountType::Fixed, 10_000.0, true));
        r.already_redeemed = true;
        let err = price_booking(&room(), d("2025-06-10"), d("2025-06-11"), d(TODAY), None, &[r])
            .unwrap_err();
        assert!(err.to_string().contains("already been used"));
    }

    #[test]
    fn test_voucher_held_by_pending_booking_rejected() {
        let mut r = resolved(discount("once", DiscountType::Fixed, 10_000.0, true));
        r.held_by = Some("b-1".to_string());
        let err = price_booking(&room(), d("2025-06-10"), d("2025-06-11"), d(TODAY), None, &[r])
            .unwrap_err();
        assert_eq!(err.code(), "invalid_discount");
        assert!(err.to_string().contains("b-1"));
    }

    #[test]
    fn test_resolve_by_code_or_id() {
        let conn = db::init_db(":memory:").unwrap();
        let mut v = discount("summer", DiscountType::Fixed, 50_000.0, true);
        v.normalize();
        queries::save_discount(&conn, &v).unwrap();

        let by_code = resolve_discounts(&conn, &["summer".to_string()], None, None).unwrap();
        assert_eq!(by_code[0].discount.id, "summer");

        let by_id = resolve_discounts(&conn, &["summer".to_string(), "".to_string()], None, None).unwrap();
        assert_eq!(by_id.len(), 1);

        let err = resolve_discounts(&conn, &["nope".to_string()], None, None).unwrap_err();
        assert_eq!(err.code(), "invalid_discount");

        let dup = resolve_discounts(&conn, &["SUMMER".to_string(), "summer".to_string()], None, None)
            .unwrap_err();
        assert!(dup.to_string().contains("more than once"));
    }

    #[test]
    fn test_personal_voucher_only_for_owner() {
        let conn = db::init_db(":memory:").unwrap();
        let owner = user(MembershipLevel::Bronze, 0);
        queries::create_user(&conn, &owner).unwrap();

        let mut v = discount("mine", DiscountType::Fixed, 50_000.0, true);
        v.owner_user_id = Some(owner.id.clone());
        queries::save_discount(&conn, &v).unwrap();

        assert!(resolve_discounts(&conn, &["MINE".to_string()], Some(&owner), None).is_ok());
        assert!(resolve_discounts(&conn, &["MINE".to_string()], None, None).is_err());
    }
}
