pub mod auth;
pub mod booking;
pub mod events;
pub mod loyalty;
pub mod payments;
pub mod pricing;
pub mod scheduling;
