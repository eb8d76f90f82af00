use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub room_id: String,
    pub user_id: Option<String>,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub adults: i64,
    pub children: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub applied_vouchers: Vec<AppliedVoucher>,
    pub base_amount: i64,
    pub total_amount: i64,
    pub cancel_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days()
    }

    /// Half-open [checkin, checkout) overlap on the same room.
    pub fn overlaps(&self, checkin: NaiveDate, checkout: NaiveDate) -> bool {
        self.checkin < checkout && checkin < self.checkout
    }

    pub fn is_awaiting_payment(&self) -> bool {
        self.status == BookingStatus::Pending && self.payment_status == PaymentStatus::Pending
    }

    pub fn is_settled(&self) -> bool {
        self.status == BookingStatus::Confirmed && self.payment_status == PaymentStatus::Paid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedVoucher {
    pub code: String,
    pub discount: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "canceled" => BookingStatus::Canceled,
            _ => BookingStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "canceled" => PaymentStatus::Canceled,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    BankTransfer,
    MobilePayment,
    Vnpay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobilePayment => "mobile_payment",
            PaymentMethod::Vnpay => "vnpay",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "credit_card" => PaymentMethod::CreditCard,
            "bank_transfer" => PaymentMethod::BankTransfer,
            "mobile_payment" => PaymentMethod::MobilePayment,
            "vnpay" => PaymentMethod::Vnpay,
            _ => PaymentMethod::Cash,
        }
    }
}

/// Broadcast to admin listeners whenever a booking changes state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub booking_id: String,
    pub room_id: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub reason: String,
    pub at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn booking(checkin: &str, checkout: &str) -> Booking {
        let now = chrono::Utc::now().naive_utc();
        Booking {
            id: "b1".to_string(),
            room_id: "r1".to_string(),
            user_id: None,
            customer_name: "Guest".to_string(),
            email: "guest@example.com".to_string(),
            phone: None,
            checkin: date(checkin),
            checkout: date(checkout),
            adults: 2,
            children: 0,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Cash,
            applied_vouchers: vec![],
            base_amount: 0,
            total_amount: 0,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_overlap_half_open() {
        let b = booking("2025-06-10", "2025-06-12");
        assert!(b.overlaps(date("2025-06-11"), date("2025-06-13")));
        assert!(b.overlaps(date("2025-06-09"), date("2025-06-11")));
        assert!(b.overlaps(date("2025-06-01"), date("2025-06-30")));
        assert!(!b.overlaps(date("2025-06-12"), date("2025-06-14")));
        assert!(!b.overlaps(date("2025-06-08"), date("2025-06-10")));
    }

    #[test]
    fn test_nights() {
        assert_eq!(booking("2025-06-10", "2025-06-13").nights(), 3);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(BookingStatus::parse("canceled"), BookingStatus::Canceled);
        assert_eq!(PaymentStatus::parse("paid").as_str(), "paid");
        assert_eq!(PaymentMethod::parse("vnpay"), PaymentMethod::Vnpay);
        assert_eq!(PaymentMethod::parse("unknown"), PaymentMethod::Cash);
    }
}
