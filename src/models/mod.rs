pub mod booking;
pub mod dates;
pub mod discount;
pub mod points;
pub mod review;
pub mod reward;
pub mod room;
pub mod user;

pub use booking::{AppliedVoucher, Booking, BookingEvent, BookingStatus, PaymentMethod, PaymentStatus};
pub use discount::{Discount, DiscountKind, DiscountType};
pub use points::{MembershipAccount, PointsTransaction};
pub use review::{RatingSummary, Review, ReviewVisibility};
pub use reward::{Reward, RewardRedemption};
pub use room::{Hotel, Room, RoomStatus};
pub use user::{MembershipLevel, Role, User};
