use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::money::{money_sum, round_money};
use crate::pricing::CalculationContext;
use crate::promotion::{PromotionDetail, PromotionMatcher, PromotionRecord, PromotionResult};

pub const FULL_REDUCTION: &str = "full_reduction";

/// "Spend `threshold`, save `reduction`". The threshold is inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullReductionMatcher {
    key: String,
    threshold: Decimal,
    reduction: Decimal,
    priority: i32,
}

impl FullReductionMatcher {
    pub fn new(threshold: Decimal, reduction: Decimal) -> Self {
        Self {
            key: FULL_REDUCTION.to_owned(),
            threshold: round_money(threshold),
            reduction: round_money(reduction),
            priority: 0,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn eligible_amount(context: &CalculationContext) -> Decimal {
        money_sum(context.items().iter().filter_map(|item| item.line_amount()))
    }
}

impl PromotionMatcher for FullReductionMatcher {
    fn promotion_type(&self) -> &str {
        &self.key
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports(&self, context: &CalculationContext) -> bool {
        !context.has_promotion(&self.key) && context.has_selected_items()
    }

    fn match_promotion(&self, context: &CalculationContext) -> PromotionResult {
        let total = Self::eligible_amount(context);
        if total < self.threshold {
            return PromotionResult::empty();
        }

        let mut promotions = BTreeMap::new();
        promotions.insert(
            self.key.clone(),
            PromotionRecord {
                promotion_type: FULL_REDUCTION.to_owned(),
                description: format!("spend {} save {}", self.threshold, self.reduction),
                threshold: self.threshold,
                reduction: self.reduction,
                applied_amount: total,
            },
        );

        let mut details = BTreeMap::new();
        details.insert(
            self.key.clone(),
            PromotionDetail {
                total_amount: total,
                threshold: self.threshold,
                reduction: self.reduction,
                saved_amount: self.reduction,
            },
        );

        PromotionResult { promotions, discount: self.reduction, details }
    }
}
