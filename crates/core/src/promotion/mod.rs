pub mod full_reduction;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{clamp_non_negative, money_add, money_sub, money_sum};
use crate::pricing::CalculationContext;

pub use self::full_reduction::FullReductionMatcher;

/// Describes an applied promotion for display and audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub promotion_type: String,
    pub description: String,
    pub threshold: Decimal,
    pub reduction: Decimal,
    pub applied_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionDetail {
    pub total_amount: Decimal,
    pub threshold: Decimal,
    pub reduction: Decimal,
    pub saved_amount: Decimal,
}

/// A matcher's verdict. The empty result means "no match" and is not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionResult {
    pub promotions: BTreeMap<String, PromotionRecord>,
    pub discount: Decimal,
    pub details: BTreeMap<String, PromotionDetail>,
}

impl Default for PromotionResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl PromotionResult {
    pub fn empty() -> Self {
        Self { promotions: BTreeMap::new(), discount: Decimal::ZERO, details: BTreeMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.promotions.is_empty() && self.discount.is_zero()
    }

    /// Folds `other` into `self`. Keys already present are kept; a later
    /// matcher cannot overwrite an earlier one under the same key.
    ///
    /// A key with a detail contributes its `saved_amount`. Whatever part of
    /// `other.discount` no detail accounts for is credited once, provided at
    /// least one key without a detail was accepted.
    pub fn merge(&mut self, other: PromotionResult) {
        let detailed = money_sum(other.details.values().map(|detail| detail.saved_amount));
        let undetailed = clamp_non_negative(money_sub(other.discount, detailed));
        let mut credit_undetailed = false;

        for (key, record) in other.promotions {
            if self.promotions.contains_key(&key) {
                continue;
            }
            match other.details.get(&key) {
                Some(detail) => {
                    self.discount = money_add(self.discount, detail.saved_amount);
                    self.details.insert(key.clone(), detail.clone());
                }
                None => credit_undetailed = true,
            }
            self.promotions.insert(key, record);
        }

        if credit_undetailed {
            self.discount = money_add(self.discount, undetailed);
        }
    }
}

pub trait PromotionMatcher: Send + Sync {
    /// Key under which a match is recorded.
    fn promotion_type(&self) -> &str;
    /// Higher runs first.
    fn priority(&self) -> i32;
    fn supports(&self, context: &CalculationContext) -> bool;
    fn match_promotion(&self, context: &CalculationContext) -> PromotionResult;
}
