use axum::http::StatusCode;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::models::dates::now;
use crate::models::{
    Booking, BookingStatus, MembershipLevel, PaymentStatus, PointsTransaction, RewardRedemption,
    User,
};

#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("Booking not found")]
    NotFound,

    #[error(
        "Points are awarded once the booking is confirmed and paid (currently {} / {}); pending confirmation",
        status.as_str(),
        payment_status.as_str()
    )]
    NotEligible {
        status: BookingStatus,
        payment_status: PaymentStatus,
    },

    #[error("Guest bookings do not earn points; sign in before booking to collect them")]
    GuestBooking,

    #[error("failed to record points: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AccrualError {
    pub fn code(&self) -> &'static str {
        match self {
            AccrualError::NotFound => "not_found",
            AccrualError::NotEligible { .. } | AccrualError::GuestBooking => "not_eligible",
            AccrualError::Storage(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccrualError::NotFound => StatusCode::NOT_FOUND,
            AccrualError::NotEligible { .. } | AccrualError::GuestBooking => {
                StatusCode::BAD_REQUEST
            }
            AccrualError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualOutcome {
    /// Points added by this call; zero on a repeat.
    pub points: i64,
    /// Points the booking earned overall, also on a repeat. Clients read it as `pointsEarned`.
    pub points_earned: i64,
    pub total_points: i64,
    pub membership_level: MembershipLevel,
    pub transaction: PointsTransaction,
    pub already_processed: bool,
}

pub fn points_for_amount(amount: i64, vnd_per_point: i64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    amount / vnd_per_point.max(1)
}

/// Awards points for a settled booking exactly once. The points go to the
/// booking's owner; `actor` must be that owner or an admin.
pub fn accrue_on_checkout(
    conn: &mut Connection,
    booking_id: &str,
    actor: &User,
    vnd_per_point: i64,
) -> Result<AccrualOutcome, AccrualError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?.ok_or(AccrualError::NotFound)?;
    if !can_access(&booking, actor) {
        return Err(AccrualError::NotFound);
    }
    if !booking.is_settled() {
        return Err(AccrualError::NotEligible {
            status: booking.status,
            payment_status: booking.payment_status,
        });
    }
    let owner_id = booking.user_id.clone().ok_or(AccrualError::GuestBooking)?;
    let owner = queries::get_user(&tx, &owner_id)?.ok_or(AccrualError::GuestBooking)?;

    if let Some(existing) = queries::get_points_transaction_for_booking(&tx, &booking.id)? {
        tracing::debug!(booking_id = %booking.id, "points already awarded for booking");
        return Ok(AccrualOutcome {
            points: 0,
            points_earned: existing.points,
            total_points: owner.points,
            membership_level: owner.membership_level,
            transaction: existing,
            already_processed: true,
        });
    }

    let earned = points_for_amount(booking.total_amount, vnd_per_point);
    let transaction = PointsTransaction {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: owner.id.clone(),
        booking_id: booking.id.clone(),
        amount: booking.total_amount,
        points: earned,
        created_at: now(),
    };
    queries::insert_points_transaction(&tx, &transaction)?;

    let total_points = owner.points + earned;
    let total_spending = owner.total_spending + booking.total_amount.max(0);
    let level = MembershipLevel::from_spending(total_spending);
    queries::update_membership_account(&tx, &owner.id, total_points, total_spending, level)?;

    tx.commit().map_err(anyhow::Error::from)?;

    if level != owner.membership_level {
        tracing::info!(
            user_id = %owner.id,
            from = owner.membership_level.as_str(),
            to = level.as_str(),
            "membership level changed"
        );
    }
    tracing::info!(
        booking_id = %booking.id,
        user_id = %owner.id,
        points = earned,
        total_points,
        "points awarded"
    );

    Ok(AccrualOutcome {
        points: earned,
        points_earned: earned,
        total_points,
        membership_level: level,
        transaction,
        already_processed: false,
    })
}

pub fn can_access(booking: &Booking, user: &User) -> bool {
    user.is_admin() || booking.user_id.as_deref() == Some(user.id.as_str())
}

// ── Rewards ──

#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("Reward not found")]
    RewardNotFound,

    #[error("This reward is no longer available")]
    Inactive,

    #[error("This reward requires {} membership (your level: {})", required.as_str(), current.as_str())]
    LevelTooLow {
        required: MembershipLevel,
        current: MembershipLevel,
    },

    #[error("Not enough points: {required} required, {available} available")]
    InsufficientPoints { required: i64, available: i64 },

    #[error("The voucher behind this reward is not available right now")]
    TemplateMissing,

    #[error("failed to redeem reward: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RedeemError {
    pub fn code(&self) -> &'static str {
        match self {
            RedeemError::RewardNotFound => "not_found",
            RedeemError::Inactive => "reward_inactive",
            RedeemError::LevelTooLow { .. } => "membership_required",
            RedeemError::InsufficientPoints { .. } => "insufficient_points",
            RedeemError::TemplateMissing => "reward_unavailable",
            RedeemError::Storage(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RedeemError::RewardNotFound => StatusCode::NOT_FOUND,
            RedeemError::Inactive | RedeemError::TemplateMissing => StatusCode::CONFLICT,
            RedeemError::LevelTooLow { .. } | RedeemError::InsufficientPoints { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RedeemError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemOutcome {
    pub voucher_code: String,
    pub remaining_points: i64,
    pub redemption: RewardRedemption,
}

/// Spends points on a reward and issues a personal copy of its template
/// voucher, valid from today until the template's end date.
pub fn redeem_reward(
    conn: &mut Connection,
    user_id: &str,
    reward_id: &str,
    today: NaiveDate,
) -> Result<RedeemOutcome, RedeemError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let reward = queries::get_reward(&tx, reward_id)?.ok_or(RedeemError::RewardNotFound)?;
    if !reward.active {
        return Err(RedeemError::Inactive);
    }
    let user = queries::get_user(&tx, user_id)?
        .ok_or_else(|| anyhow::anyhow!("user {user_id} vanished during redemption"))?;

    if user.membership_level < reward.membership_level {
        return Err(RedeemError::LevelTooLow {
            required: reward.membership_level,
            current: user.membership_level,
        });
    }
    if user.points < reward.points_required {
        return Err(RedeemError::InsufficientPoints {
            required: reward.points_required,
            available: user.points,
        });
    }

    let template = queries::get_discount_by_code(&tx, &reward.voucher_code)?
        .filter(|t| t.owner_user_id.is_none() && t.end_date >= today)
        .ok_or(RedeemError::TemplateMissing)?;

    let template_code = template.code.clone().unwrap_or_else(|| reward.voucher_code.to_uppercase());
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    let voucher_code = format!("{template_code}-{suffix}");

    let mut voucher = template;
    voucher.id = uuid::Uuid::new_v4().to_string();
    voucher.code = Some(voucher_code.clone());
    voucher.owner_user_id = Some(user.id.clone());
    voucher.start_date = today;
    queries::save_discount(&tx, &voucher)?;

    let remaining_points = user.points - reward.points_required;
    queries::update_membership_account(
        &tx,
        &user.id,
        remaining_points,
        user.total_spending,
        user.membership_level,
    )?;

    let redemption = RewardRedemption {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        reward_id: reward.id.clone(),
        reward_name: reward.name.clone(),
        points_spent: reward.points_required,
        voucher_code: voucher_code.clone(),
        created_at: now(),
    };
    queries::insert_reward_redemption(&tx, &redemption)?;

    tx.commit().map_err(anyhow::Error::from)?;

    tracing::info!(
        user_id = %user.id,
        reward_id = %reward.id,
        voucher_code = %voucher_code,
        remaining_points,
        "reward redeemed"
    );

    Ok(RedeemOutcome {
        voucher_code,
        remaining_points,
        redemption,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{
        Discount, DiscountKind, DiscountType, PaymentMethod, Reward, Role, Room, RoomStatus,
    };

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@example.com"),
            password_hash: String::new(),
            phone: None,
            role,
            points: 0,
            total_spending: 0,
            membership_level: MembershipLevel::Bronze,
            created_at: now(),
        }
    }

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::create_user(&conn, &user("alice", Role::User)).unwrap();
        queries::create_user(&conn, &user("admin", Role::Admin)).unwrap();
        queries::save_room(
            &conn,
            &Room {
                id: "room-1".to_string(),
                hotel_id: None,
                name: "Suite".to_string(),
                room_type: "Suite".to_string(),
                maxcount: 2,
                beds: 1,
                baths: 1,
                phonenumber: None,
                rentperday: 3_000_000,
                description: None,
                availability_status: RoomStatus::Available,
            },
        )
        .unwrap();
        conn
    }

    fn insert_booking(conn: &Connection, id: &str, owner: Option<&str>, total: i64, settled: bool) {
        let booking = Booking {
            id: id.to_string(),
            room_id: "room-1".to_string(),
            user_id: owner.map(str::to_string),
            customer_name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: None,
            checkin: d("2025-06-10"),
            checkout: d("2025-06-12"),
            adults: 1,
            children: 0,
            status: if settled { BookingStatus::Confirmed } else { BookingStatus::Pending },
            payment_status: if settled { PaymentStatus::Paid } else { PaymentStatus::Pending },
            payment_method: PaymentMethod::Cash,
            applied_vouchers: vec![],
            base_amount: total,
            total_amount: total,
            cancel_reason: None,
            created_at: now(),
            updated_at: now(),
        };
        queries::create_booking(conn, &booking).unwrap();
    }

    #[test]
    fn test_points_for_amount_floors() {
        assert_eq!(points_for_amount(6_000_000, 10_000), 600);
        assert_eq!(points_for_amount(19_999, 10_000), 1);
        assert_eq!(points_for_amount(9_999, 10_000), 0);
        assert_eq!(points_for_amount(-5, 10_000), 0);
        assert_eq!(points_for_amount(500, 0), 500);
    }

    #[test]
    fn test_accrual_awards_and_levels_up() {
        let mut conn = setup();
        insert_booking(&conn, "b1", Some("alice"), 6_000_000, true);
        let alice = queries::get_user(&conn, "alice").unwrap().unwrap();

        let outcome = accrue_on_checkout(&mut conn, "b1", &alice, 10_000).unwrap();
        assert_eq!(outcome.points, 600);
        assert_eq!(outcome.total_points, 600);
        assert_eq!(outcome.membership_level, MembershipLevel::Silver);
        assert!(!outcome.already_processed);

        let alice = queries::get_user(&conn, "alice").unwrap().unwrap();
        assert_eq!(alice.points, 600);
        assert_eq!(alice.total_spending, 6_000_000);
        assert_eq!(alice.membership_level, MembershipLevel::Silver);
    }

    #[test]
    fn test_accrual_is_idempotent() {
        let mut conn = setup();
        insert_booking(&conn, "b1", Some("alice"), 2_000_000, true);
        let alice = queries::get_user(&conn, "alice").unwrap().unwrap();

        let first = accrue_on_checkout(&mut conn, "b1", &alice, 10_000).unwrap();
        let second = accrue_on_checkout(&mut conn, "b1", &alice, 10_000).unwrap();

        assert_eq!(second.points, 0);
        assert!(second.already_processed);
        assert_eq!(second.total_points, first.total_points);
        assert_eq!(second.transaction.id, first.transaction.id);

        let alice = queries::get_user(&conn, "alice").unwrap().unwrap();
        assert_eq!(alice.points, 200);
        assert_eq!(alice.total_spending, 2_000_000);
    }

    #[test]
    fn test_unsettled_booking_not_eligible() {
        let mut conn = setup();
        insert_booking(&conn, "b1", Some("alice"), 2_000_000, false);
        let alice = queries::get_user(&conn, "alice").unwrap().unwrap();

        let err = accrue_on_checkout(&mut conn, "b1", &alice, 10_000).unwrap_err();
        assert_eq!(err.code(), "not_eligible");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("pending confirmation"));
        assert!(queries::get_points_transaction_for_booking(&conn, "b1").unwrap().is_none());
    }

    #[test]
    fn test_guest_booking_not_eligible() {
        let mut conn = setup();
        insert_booking(&conn, "b1", None, 2_000_000, true);
        let admin = queries::get_user(&conn, "admin").unwrap().unwrap();

        let err = accrue_on_checkout(&mut conn, "b1", &admin, 10_000).unwrap_err();
        assert!(matches!(err, AccrualError::GuestBooking));
    }

    #[test]
    fn test_admin_accrues_for_owner_and_strangers_cannot() {
        let mut conn = setup();
        queries::create_user(&conn, &user("mallory", Role::User)).unwrap();
        insert_booking(&conn, "b1", Some("alice"), 1_000_000, true);

        let mallory = queries::get_user(&conn, "mallory").unwrap().unwrap();
        let err = accrue_on_checkout(&mut conn, "b1", &mallory, 10_000).unwrap_err();
        assert!(matches!(err, AccrualError::NotFound));

        let admin = queries::get_user(&conn, "admin").unwrap().unwrap();
        let outcome = accrue_on_checkout(&mut conn, "b1", &admin, 10_000).unwrap();
        assert_eq!(outcome.transaction.user_id, "alice");
        let admin = queries::get_user(&conn, "admin").unwrap().unwrap();
        assert_eq!(admin.points, 0);
    }

    fn seed_reward(conn: &Connection, level: MembershipLevel, points_required: i64) {
        let template = Discount {
            id: "tpl".to_string(),
            name: "Reward voucher".to_string(),
            code: Some("REWARD10".to_string()),
            description: None,
            kind: DiscountKind::Voucher,
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            applicable_room_ids: vec![],
            start_date: d("2025-01-01"),
            end_date: d("2025-12-31"),
            min_booking_amount: 0,
            max_discount: Some(500_000),
            is_stackable: true,
            membership_level: None,
            min_spending: None,
            owner_user_id: None,
        };
        queries::save_discount(conn, &template).unwrap();
        queries::save_reward(
            conn,
            &Reward {
                id: "r1".to_string(),
                name: "10% off".to_string(),
                description: None,
                membership_level: level,
                points_required,
                voucher_code: "REWARD10".to_string(),
                active: true,
            },
        )
        .unwrap();
    }

    fn give_points(conn: &Connection, user_id: &str, points: i64, spending: i64) {
        queries::update_membership_account(
            conn,
            user_id,
            points,
            spending,
            MembershipLevel::from_spending(spending),
        )
        .unwrap();
    }

    #[test]
    fn test_redeem_issues_personal_voucher() {
        let mut conn = setup();
        seed_reward(&conn, MembershipLevel::Bronze, 100);
        give_points(&conn, "alice", 250, 1_000_000);

        let outcome = redeem_reward(&mut conn, "alice", "r1", d("2025-06-01")).unwrap();
        assert!(outcome.voucher_code.starts_with("REWARD10-"));
        assert_eq!(outcome.voucher_code.len(), "REWARD10-".len() + 6);
        assert_eq!(outcome.remaining_points, 150);

        let voucher = queries::get_discount_by_code(&conn, &outcome.voucher_code)
            .unwrap()
            .unwrap();
        assert_eq!(voucher.owner_user_id.as_deref(), Some("alice"));
        assert_eq!(voucher.start_date, d("2025-06-01"));
        assert_eq!(voucher.end_date, d("2025-12-31"));

        let history = queries::list_reward_redemptions(&conn, "alice").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].points_spent, 100);
    }

    #[test]
    fn test_redeem_requires_points_and_level() {
        let mut conn = setup();
        seed_reward(&conn, MembershipLevel::Gold, 100);
        give_points(&conn, "alice", 500, 1_000_000);

        let err = redeem_reward(&mut conn, "alice", "r1", d("2025-06-01")).unwrap_err();
        assert!(matches!(err, RedeemError::LevelTooLow { .. }));

        give_points(&conn, "alice", 50, 25_000_000);
        let err = redeem_reward(&mut conn, "alice", "r1", d("2025-06-01")).unwrap_err();
        assert!(matches!(
            err,
            RedeemError::InsufficientPoints { required: 100, available: 50 }
        ));

        // Nothing was spent by the failed attempts
        let alice = queries::get_user(&conn, "alice").unwrap().unwrap();
        assert_eq!(alice.points, 50);
    }

    #[test]
    fn test_redeem_expired_template() {
        let mut conn = setup();
        seed_reward(&conn, MembershipLevel::Bronze, 10);
        give_points(&conn, "alice", 100, 0);

        let err = redeem_reward(&mut conn, "alice", "r1", d("2026-01-15")).unwrap_err();
        assert!(matches!(err, RedeemError::TemplateMissing));
        assert_eq!(queries::get_user(&conn, "alice").unwrap().unwrap().points, 100);
    }
}
