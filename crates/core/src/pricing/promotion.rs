use std::cmp::Reverse;
use std::sync::Arc;

use crate::errors::PricingError;
use crate::pricing::{CalculationContext, PriceCalculator, PriceResult};
use crate::promotion::{PromotionMatcher, PromotionResult};

pub const PROMOTION_PRIORITY: i32 = 500;

/// Composes promotion matchers into a single discount step.
///
/// Matchers run in descending priority, ties in registration order. Each one
/// sees the same context; their discounts add up.
#[derive(Clone, Default)]
pub struct PromotionCalculator {
    matchers: Vec<Arc<dyn PromotionMatcher>>,
}

impl PromotionCalculator {
    pub fn new(matchers: Vec<Arc<dyn PromotionMatcher>>) -> Self {
        let mut calculator = Self { matchers };
        calculator.matchers.sort_by_key(|matcher| Reverse(matcher.priority()));
        calculator
    }

    pub fn with_matcher(mut self, matcher: impl PromotionMatcher + 'static) -> Self {
        self.matchers.push(Arc::new(matcher));
        self.matchers.sort_by_key(|matcher| Reverse(matcher.priority()));
        self
    }

    pub fn matcher_types(&self) -> Vec<String> {
        self.matchers.iter().map(|matcher| matcher.promotion_type().to_owned()).collect()
    }

    pub fn match_all(&self, context: &CalculationContext) -> PromotionResult {
        let mut combined = PromotionResult::empty();
        for matcher in &self.matchers {
            if matcher.supports(context) {
                combined.merge(matcher.match_promotion(context));
            }
        }
        combined
    }
}

impl PriceCalculator for PromotionCalculator {
    fn calculator_type(&self) -> &str {
        "promotion"
    }

    fn priority(&self) -> i32 {
        PROMOTION_PRIORITY
    }

    fn supports(&self, context: &CalculationContext) -> bool {
        self.matchers.iter().any(|matcher| matcher.supports(context))
    }

    fn calculate(&self, context: &CalculationContext) -> Result<PriceResult, PricingError> {
        let matched = self.match_all(context);
        if matched.is_empty() {
            return Ok(PriceResult::default());
        }

        let detail = matched.promotions.keys().cloned().collect::<Vec<_>>().join(", ");
        Ok(PriceResult::discount(matched.discount, matched.promotions, "promotion", detail))
    }
}
