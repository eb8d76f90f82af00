pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod discounts;
pub mod health;
pub mod payments;
pub mod reviews;
pub mod rewards;
pub mod users;

use std::sync::Arc;

use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // users
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login))
        .route("/api/users/logout", post(users::logout))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/users/allusers", get(users::all_users))
        .route("/api/users/points", get(users::get_points))
        .route(
            "/api/users/membership/level/:id",
            get(users::membership_level),
        )
        .route(
            "/api/users/membership/benefits/:id",
            get(users::membership_benefits),
        )
        .route(
            "/api/users/staff",
            get(users::list_staff).post(users::create_staff),
        )
        .route(
            "/api/users/staff/:id",
            put(users::update_staff).delete(users::remove_staff),
        )
        // hotels and rooms
        .route(
            "/api/hotels",
            get(catalog::list_hotels).post(catalog::create_hotel),
        )
        .route(
            "/api/hotels/:id",
            put(catalog::update_hotel).delete(catalog::delete_hotel),
        )
        .route("/api/hotels/:id/rooms", get(catalog::hotel_rooms))
        .route("/api/rooms/getallrooms", get(catalog::all_rooms))
        .route("/api/rooms/getroombyid", post(catalog::room_by_id))
        .route("/api/rooms/suggestions", get(catalog::room_suggestions))
        .route("/api/rooms", post(catalog::create_room))
        .route(
            "/api/rooms/:id",
            put(catalog::update_room).delete(catalog::delete_room),
        )
        // discounts
        .route(
            "/api/discounts",
            get(discounts::list_active).post(discounts::create_discount),
        )
        .route("/api/discounts/admin", get(discounts::list_all))
        .route("/api/discounts/apply", post(discounts::apply_discounts))
        .route("/api/discounts/accumulated", get(discounts::accumulated))
        .route(
            "/api/discounts/:id",
            put(discounts::update_discount).delete(discounts::delete_discount),
        )
        // bookings
        .route("/api/bookings", get(bookings::list_bookings))
        .route("/api/bookings/bookroom", post(bookings::book_room))
        .route("/api/bookings/validate", post(bookings::validate))
        .route("/api/bookings/checkout", post(bookings::checkout))
        .route("/api/bookings/check", get(bookings::check_booking))
        .route("/api/bookings/cancel-reason", get(bookings::cancel_reason))
        .route("/api/bookings/history/:user_id", get(bookings::history))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/confirm", put(bookings::confirm))
        .route("/api/bookings/:id/cancel", put(bookings::cancel))
        .route(
            "/api/bookings/:id/payment-deadline",
            get(bookings::payment_deadline),
        )
        // rewards
        .route("/api/rewards", get(rewards::list_rewards))
        .route(
            "/api/rewards/admin",
            get(rewards::admin_list).post(rewards::create_reward),
        )
        .route("/api/rewards/redeem", post(rewards::redeem))
        .route("/api/rewards/history", get(rewards::history))
        .route("/api/rewards/vouchers", get(rewards::vouchers))
        .route(
            "/api/rewards/:id",
            put(rewards::update_reward).delete(rewards::delete_reward),
        )
        // reviews
        .route(
            "/api/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route("/api/reviews/average", get(reviews::average))
        .route("/api/reviews/by-email", get(reviews::by_email))
        .route("/api/reviews/:id", delete(reviews::delete_review))
        .route("/api/reviews/:id/toggle-hidden", patch(reviews::toggle_hidden))
        // payments
        .route("/api/momo/create-payment", post(payments::momo_create))
        .route("/api/momo/ipn", post(payments::momo_ipn))
        .route("/api/vnpay/create-payment", post(payments::vnpay_create))
        .route("/api/vnpay/return", get(payments::vnpay_return))
        // admin
        .route("/api/admin/bookings/events", get(admin::events_stream))
        .with_state(state)
}
