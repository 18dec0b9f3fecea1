use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Free-form redemption metadata (order id, channel, ...).
pub type CouponMetadata = BTreeMap<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponState {
    Available,
    Locked,
    Redeemed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub owner: UserId,
    pub valid: bool,
    pub locked: bool,
    pub discount_amount: Decimal,
    pub threshold: Option<Decimal>,
    #[serde(default)]
    pub metadata: CouponMetadata,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Coupon {
    pub fn state(&self) -> CouponState {
        match (self.valid, self.locked) {
            (false, _) => CouponState::Redeemed,
            (true, true) => CouponState::Locked,
            (true, false) => CouponState::Available,
        }
    }

    pub fn can_transition_to(&self, next: CouponState) -> bool {
        matches!(
            (self.state(), next),
            (CouponState::Available, CouponState::Locked)
                | (CouponState::Locked, CouponState::Available)
                | (CouponState::Locked, CouponState::Redeemed)
        )
    }

    /// Reserves the coupon. Fails on a coupon that is already locked or spent.
    pub fn lock(&mut self) -> bool {
        if !self.can_transition_to(CouponState::Locked) {
            return false;
        }
        self.locked = true;
        true
    }

    /// Releases a reservation. Releasing an available coupon is a no-op success.
    pub fn unlock(&mut self) -> bool {
        match self.state() {
            CouponState::Locked => {
                self.locked = false;
                true
            }
            CouponState::Available => true,
            CouponState::Redeemed => false,
        }
    }

    /// Consumes a locked coupon, merging `metadata` over the stored metadata.
    pub fn redeem(&mut self, metadata: CouponMetadata, redeemed_at: DateTime<Utc>) -> bool {
        if !self.can_transition_to(CouponState::Redeemed) {
            return false;
        }
        self.valid = false;
        self.locked = false;
        self.redeemed_at = Some(redeemed_at);
        self.metadata.extend(metadata);
        true
    }
}
