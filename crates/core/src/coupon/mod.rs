//! Coupon sources and the chain that routes a code to exactly one of them.
//!
//! Each provider owns the lifecycle of the coupons it supports:
//! `available -> locked -> redeemed`, with `locked -> available` on unlock.
//! Providers enforce the state machine themselves and must make `lock` and
//! `unlock` safe to repeat.

pub mod chain;

use async_trait::async_trait;

use crate::domain::coupon::{Coupon, CouponMetadata};
use crate::domain::user::UserId;
use crate::errors::CouponError;

pub use self::chain::CouponProviderChain;

#[async_trait]
pub trait CouponProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Cheap routing predicate on the code alone.
    fn supports(&self, code: &str) -> bool;

    async fn find_by_code(&self, code: &str, user: &UserId)
        -> Result<Option<Coupon>, CouponError>;

    /// Reserves the coupon. `Ok(false)` when it is missing, spent or already
    /// locked.
    async fn lock(&self, code: &str, user: &UserId) -> Result<bool, CouponError>;

    /// Releases a reservation. Must return `Ok(true)` when nothing is locked.
    async fn unlock(&self, code: &str, user: &UserId) -> Result<bool, CouponError>;

    /// Consumes a locked coupon. `Ok(false)` when the coupon is not locked.
    async fn redeem(
        &self,
        code: &str,
        user: &UserId,
        metadata: CouponMetadata,
    ) -> Result<bool, CouponError>;
}

/// Last-resort lookup consulted when no provider knows a code, e.g. a bridge
/// to a partner system. It answers once; the first answer is final.
#[async_trait]
pub trait CouponResolver: Send + Sync {
    async fn resolve(&self, code: &str, user: &UserId) -> Result<Option<Coupon>, CouponError>;
}
