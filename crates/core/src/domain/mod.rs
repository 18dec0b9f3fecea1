pub mod coupon;
pub mod item;
pub mod user;
