use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::coupon::Coupon;
use crate::domain::item::CheckoutItem;
use crate::domain::user::UserId;
use crate::money::{clamp_non_negative, money_add, money_sub};
use crate::pricing::PriceResult;
use crate::promotion::PromotionRecord;

/// Everything a calculator may look at while pricing one checkout.
///
/// Items are fixed at construction and only ever handed out by shared
/// reference. The running totals and the applied-promotion map are advanced by
/// [`crate::pricing::PriceCalculationService`] after each calculator, so later
/// calculators see what earlier ones did.
#[derive(Clone, Debug, PartialEq)]
pub struct CalculationContext {
    user: UserId,
    items: Vec<CheckoutItem>,
    applied_promotions: BTreeMap<String, PromotionRecord>,
    coupon: Option<Coupon>,
    points_requested: u32,
    subtotal: Decimal,
    discount_total: Decimal,
}

impl CalculationContext {
    pub fn new(user: UserId, items: Vec<CheckoutItem>) -> Self {
        Self {
            user,
            items,
            applied_promotions: BTreeMap::new(),
            coupon: None,
            points_requested: 0,
            subtotal: Decimal::ZERO,
            discount_total: Decimal::ZERO,
        }
    }

    pub fn with_coupon(mut self, coupon: Option<Coupon>) -> Self {
        self.coupon = coupon;
        self
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points_requested = points;
        self
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn items(&self) -> &[CheckoutItem] {
        &self.items
    }

    pub fn selected_items(&self) -> impl Iterator<Item = &CheckoutItem> {
        self.items.iter().filter(|item| item.selected())
    }

    pub fn has_selected_items(&self) -> bool {
        self.selected_items().next().is_some()
    }

    pub fn applied_promotions(&self) -> &BTreeMap<String, PromotionRecord> {
        &self.applied_promotions
    }

    pub fn has_promotion(&self, key: &str) -> bool {
        self.applied_promotions.contains_key(key)
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    pub fn points_requested(&self) -> u32 {
        self.points_requested
    }

    /// Base amount established so far.
    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    pub fn discount_total(&self) -> Decimal {
        self.discount_total
    }

    /// What is still left to discount: `max(0, subtotal - discounts)`.
    pub fn remaining_amount(&self) -> Decimal {
        clamp_non_negative(money_sub(self.subtotal, self.discount_total))
    }

    pub(crate) fn absorb(&mut self, step: &PriceResult) {
        self.subtotal = money_add(self.subtotal, step.base_amount);
        self.discount_total = money_add(self.discount_total, step.discount_amount);
        for (key, record) in &step.applied_promotions {
            self.applied_promotions.insert(key.clone(), record.clone());
        }
    }
}
