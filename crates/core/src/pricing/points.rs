use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::PricingError;
use crate::money::MONEY_SCALE;
use crate::pricing::{CalculationContext, PriceCalculator, PriceResult};

pub const POINTS_PRIORITY: i32 = 200;

/// Redeems loyalty points at `points_per_unit` points per 1.00, never beyond
/// what is left to pay.
#[derive(Clone, Copy, Debug)]
pub struct PointsDeductionCalculator {
    points_per_unit: u32,
}

impl PointsDeductionCalculator {
    pub fn new(points_per_unit: u32) -> Self {
        Self { points_per_unit }
    }

    /// Money value of `points`, truncated to whole cents.
    pub fn points_value(&self, points: u32) -> Decimal {
        if self.points_per_unit == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(points) / Decimal::from(self.points_per_unit))
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
    }

    /// Points needed to cover `amount`, rounded up.
    pub fn points_for(&self, amount: Decimal) -> u32 {
        (amount * Decimal::from(self.points_per_unit)).ceil().to_u32().unwrap_or(u32::MAX)
    }
}

impl PriceCalculator for PointsDeductionCalculator {
    fn calculator_type(&self) -> &str {
        "points"
    }

    fn priority(&self) -> i32 {
        POINTS_PRIORITY
    }

    fn supports(&self, context: &CalculationContext) -> bool {
        self.points_per_unit > 0 && context.points_requested() > 0
    }

    fn calculate(&self, context: &CalculationContext) -> Result<PriceResult, PricingError> {
        let requested = context.points_requested();
        let amount = self.points_value(requested).min(context.remaining_amount());
        if amount <= Decimal::ZERO {
            return Ok(PriceResult::default());
        }

        let points_used = self.points_for(amount).min(requested);
        let mut result = PriceResult::discount(
            amount,
            Default::default(),
            "points",
            format!("{points_used} points at {} per unit", self.points_per_unit),
        );
        result.points_used = points_used;
        Ok(result)
    }
}
