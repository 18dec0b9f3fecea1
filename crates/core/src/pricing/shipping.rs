use rust_decimal::Decimal;

use crate::errors::PricingError;
use crate::money::round_money;
use crate::pricing::{CalculationContext, PriceCalculator, PriceResult};

pub const SHIPPING_PRIORITY: i32 = 100;

/// Flat shipping fee, waived once the discounted amount reaches
/// `free_threshold`.
#[derive(Clone, Copy, Debug)]
pub struct ShippingFeeCalculator {
    flat_fee: Decimal,
    free_threshold: Option<Decimal>,
}

impl ShippingFeeCalculator {
    pub fn new(flat_fee: Decimal, free_threshold: Option<Decimal>) -> Self {
        Self { flat_fee: round_money(flat_fee), free_threshold: free_threshold.map(round_money) }
    }
}

impl PriceCalculator for ShippingFeeCalculator {
    fn calculator_type(&self) -> &str {
        "shipping"
    }

    fn priority(&self) -> i32 {
        SHIPPING_PRIORITY
    }

    fn supports(&self, context: &CalculationContext) -> bool {
        self.flat_fee > Decimal::ZERO && context.has_selected_items()
    }

    fn calculate(&self, context: &CalculationContext) -> Result<PriceResult, PricingError> {
        let amount = context.remaining_amount();
        match self.free_threshold {
            Some(threshold) if amount >= threshold => Ok(PriceResult::shipping(
                Decimal::ZERO,
                format!("waived at {amount} (free from {threshold})"),
            )),
            _ => Ok(PriceResult::shipping(self.flat_fee, "flat fee")),
        }
    }
}
