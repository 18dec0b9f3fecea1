use crate::errors::PricingError;
use crate::money::money_sum;
use crate::pricing::{CalculationContext, PriceCalculator, PriceResult};

pub const BASE_PRIORITY: i32 = 1000;

/// Establishes the subtotal: `unit_price * quantity` over selected items.
/// Unselected and unpriced items contribute nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasePriceCalculator;

impl PriceCalculator for BasePriceCalculator {
    fn calculator_type(&self) -> &str {
        "base"
    }

    fn priority(&self) -> i32 {
        BASE_PRIORITY
    }

    fn supports(&self, _context: &CalculationContext) -> bool {
        true
    }

    fn calculate(&self, context: &CalculationContext) -> Result<PriceResult, PricingError> {
        let subtotal = money_sum(context.items().iter().filter_map(|item| item.line_amount()));
        Ok(PriceResult::base(subtotal, "base", "sum(unit_price * quantity) over selected items"))
    }
}
