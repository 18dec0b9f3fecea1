use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::errors::PricingError;
use crate::money::round_money;
use crate::pricing::{CalculationContext, PriceCalculator, PriceResult};
use crate::promotion::PromotionRecord;

pub const COUPON_PRIORITY: i32 = 300;
pub const COUPON_PROMOTION_KEY: &str = "coupon";

/// Applies the resolved coupon's fixed amount against what promotions left.
#[derive(Clone, Copy, Debug, Default)]
pub struct CouponDiscountCalculator;

impl PriceCalculator for CouponDiscountCalculator {
    fn calculator_type(&self) -> &str {
        "coupon"
    }

    fn priority(&self) -> i32 {
        COUPON_PRIORITY
    }

    fn supports(&self, context: &CalculationContext) -> bool {
        context.coupon().is_some_and(|coupon| coupon.valid)
            && !context.has_promotion(COUPON_PROMOTION_KEY)
    }

    fn calculate(&self, context: &CalculationContext) -> Result<PriceResult, PricingError> {
        let Some(coupon) = context.coupon() else {
            return Ok(PriceResult::default());
        };

        let subtotal = context.subtotal();
        let threshold = coupon.threshold.map(round_money).unwrap_or(Decimal::ZERO);
        if subtotal < threshold {
            return Ok(PriceResult::default());
        }

        let amount = round_money(coupon.discount_amount).min(context.remaining_amount());
        if amount <= Decimal::ZERO {
            return Ok(PriceResult::default());
        }

        let mut promotions = BTreeMap::new();
        promotions.insert(
            COUPON_PROMOTION_KEY.to_owned(),
            PromotionRecord {
                promotion_type: COUPON_PROMOTION_KEY.to_owned(),
                description: format!("coupon {}", coupon.code),
                threshold,
                reduction: round_money(coupon.discount_amount),
                applied_amount: subtotal,
            },
        );

        Ok(PriceResult::discount(amount, promotions, "coupon", coupon.code.clone()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::CouponDiscountCalculator;
    use crate::domain::coupon::{Coupon, CouponMetadata};
    use crate::domain::item::{CheckoutItem, CheckoutItemId, Sku, SkuId};
    use crate::domain::user::UserId;
    use crate::pricing::{
        BasePriceCalculator, CalculationContext, PriceCalculationService, PromotionCalculator,
    };
    use crate::promotion::FullReductionMatcher;

    fn coupon(amount: i64, threshold: Option<i64>) -> Coupon {
        Coupon {
            id: "cpn-1".to_owned(),
            code: "SAVE".to_owned(),
            owner: UserId("user-1".to_owned()),
            valid: true,
            locked: false,
            discount_amount: Decimal::new(amount, 2),
            threshold: threshold.map(|cents| Decimal::new(cents, 2)),
            metadata: CouponMetadata::new(),
            redeemed_at: None,
        }
    }

    fn priced(cents: i64, coupon: Coupon) -> crate::pricing::PriceResult {
        priced_with(PriceCalculationService::new(), cents, coupon)
    }

    fn priced_with(
        service: PriceCalculationService,
        cents: i64,
        coupon: Coupon,
    ) -> crate::pricing::PriceResult {
        let sku_id = SkuId("sku-1".to_owned());
        let item = CheckoutItem::new(
            CheckoutItemId("row-1".to_owned()),
            sku_id.clone(),
            1,
            true,
            Some(Sku { id: sku_id, name: "item".to_owned(), unit_price: Some(Decimal::new(cents, 2)) }),
        )
        .expect("valid item");
        let mut context = CalculationContext::new(UserId("user-1".to_owned()), vec![item])
            .with_coupon(Some(coupon));
        service
            .with_calculator(BasePriceCalculator)
            .with_calculator(CouponDiscountCalculator)
            .calculate(&mut context)
            .expect("pricing succeeds")
    }

    #[test]
    fn applies_coupon_amount() {
        let result = priced(5000, coupon(500, None));
        assert_eq!(result.discount_amount, Decimal::new(500, 2));
        assert_eq!(result.final_amount, Decimal::new(4500, 2));
        assert_eq!(result.applied_promotions["coupon"].description, "coupon SAVE");
    }

    #[test]
    fn caps_coupon_at_remaining_amount() {
        let result = priced(300, coupon(500, None));
        assert_eq!(result.discount_amount, Decimal::new(300, 2));
        assert_eq!(result.final_amount, Decimal::ZERO);
    }

    #[test]
    fn skips_coupon_below_its_threshold() {
        let result = priced(4999, coupon(500, Some(5000)));
        assert_eq!(result.discount_amount, Decimal::ZERO);
        assert!(result.applied_promotions.is_empty());

        let at_threshold = priced(5000, coupon(500, Some(5000)));
        assert_eq!(at_threshold.discount_amount, Decimal::new(500, 2));
    }

    #[test]
    fn threshold_is_measured_before_promotions() {
        let promotions = PromotionCalculator::new(Vec::new())
            .with_matcher(FullReductionMatcher::new(Decimal::new(5000, 2), Decimal::new(1000, 2)));
        let service = PriceCalculationService::new().with_calculator(promotions);

        let result = priced_with(service, 5000, coupon(500, Some(5000)));

        assert_eq!(result.discount_amount, Decimal::new(1500, 2));
        assert_eq!(result.final_amount, Decimal::new(3500, 2));
        assert_eq!(result.applied_promotions["coupon"].applied_amount, Decimal::new(5000, 2));
    }
}
