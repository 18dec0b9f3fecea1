pub mod base;
pub mod context;
pub mod coupon;
pub mod points;
pub mod promotion;
pub mod shipping;

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PricingConfig;
use crate::errors::PricingError;
use crate::money::{clamp_non_negative, money_add, money_sub};
use crate::promotion::full_reduction::FullReductionMatcher;
use crate::promotion::{PromotionMatcher, PromotionRecord};

pub use self::base::BasePriceCalculator;
pub use self::context::CalculationContext;
pub use self::coupon::CouponDiscountCalculator;
pub use self::points::PointsDeductionCalculator;
pub use self::promotion::PromotionCalculator;
pub use self::shipping::ShippingFeeCalculator;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

/// Output of a single calculator, and of the whole chain once composed.
///
/// A calculator fills in only the components it owns; the service folds the
/// steps together and derives `final_amount` and `payable_amount` last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceResult {
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub shipping_fee: Decimal,
    pub final_amount: Decimal,
    pub payable_amount: Decimal,
    pub points_used: u32,
    pub applied_promotions: BTreeMap<String, PromotionRecord>,
    pub trace: Vec<PricingTraceStep>,
}

impl Default for PriceResult {
    fn default() -> Self {
        Self {
            base_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            shipping_fee: Decimal::ZERO,
            final_amount: Decimal::ZERO,
            payable_amount: Decimal::ZERO,
            points_used: 0,
            applied_promotions: BTreeMap::new(),
            trace: Vec::new(),
        }
    }
}

impl PriceResult {
    pub fn base(amount: Decimal, stage: &str, detail: impl Into<String>) -> Self {
        Self {
            base_amount: amount,
            trace: vec![PricingTraceStep {
                stage: stage.to_owned(),
                detail: detail.into(),
                amount,
            }],
            ..Self::default()
        }
    }

    pub fn discount(
        amount: Decimal,
        promotions: BTreeMap<String, PromotionRecord>,
        stage: &str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            discount_amount: amount,
            applied_promotions: promotions,
            trace: vec![PricingTraceStep {
                stage: stage.to_owned(),
                detail: detail.into(),
                amount,
            }],
            ..Self::default()
        }
    }

    pub fn shipping(fee: Decimal, detail: impl Into<String>) -> Self {
        Self {
            shipping_fee: fee,
            trace: vec![PricingTraceStep {
                stage: "shipping".to_owned(),
                detail: detail.into(),
                amount: fee,
            }],
            ..Self::default()
        }
    }

    fn absorb(&mut self, step: PriceResult) {
        self.base_amount = money_add(self.base_amount, step.base_amount);
        self.discount_amount = money_add(self.discount_amount, step.discount_amount);
        self.shipping_fee = money_add(self.shipping_fee, step.shipping_fee);
        self.points_used = self.points_used.saturating_add(step.points_used);
        self.applied_promotions.extend(step.applied_promotions);
        self.trace.extend(step.trace);
    }

    fn finalize(mut self) -> Self {
        self.final_amount = clamp_non_negative(money_sub(self.base_amount, self.discount_amount));
        self.payable_amount = money_add(self.final_amount, self.shipping_fee);
        self
    }
}

pub trait PriceCalculator: Send + Sync {
    /// Stable identifier used in traces and logs.
    fn calculator_type(&self) -> &str;
    /// Higher runs first.
    fn priority(&self) -> i32;
    fn supports(&self, context: &CalculationContext) -> bool;
    fn calculate(&self, context: &CalculationContext) -> Result<PriceResult, PricingError>;
}

/// Runs registered calculators in descending priority. Equal priorities keep
/// registration order.
#[derive(Clone, Default)]
pub struct PriceCalculationService {
    calculators: Vec<Arc<dyn PriceCalculator>>,
}

impl PriceCalculationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calculator(mut self, calculator: impl PriceCalculator + 'static) -> Self {
        self.register(Arc::new(calculator));
        self
    }

    pub fn register(&mut self, calculator: Arc<dyn PriceCalculator>) {
        self.calculators.push(calculator);
        // sort_by_key is stable, so ties stay in registration order
        self.calculators.sort_by_key(|calculator| Reverse(calculator.priority()));
    }

    /// Calculator types in execution order.
    pub fn calculator_types(&self) -> Vec<String> {
        self.calculators.iter().map(|calculator| calculator.calculator_type().to_owned()).collect()
    }

    /// Assembles the standard chain: base, configured promotions, coupon,
    /// points, shipping.
    pub fn from_config(config: &PricingConfig) -> Self {
        let matchers = config
            .full_reduction
            .iter()
            .map(|rule| {
                Arc::new(
                    FullReductionMatcher::new(rule.threshold, rule.reduction)
                        .with_key(rule.key.clone())
                        .with_priority(rule.priority),
                ) as Arc<dyn PromotionMatcher>
            })
            .collect::<Vec<_>>();

        let mut service = Self::new()
            .with_calculator(BasePriceCalculator)
            .with_calculator(PromotionCalculator::new(matchers))
            .with_calculator(CouponDiscountCalculator);

        if config.points.points_per_unit > 0 {
            service =
                service.with_calculator(PointsDeductionCalculator::new(config.points.points_per_unit));
        }

        service.with_calculator(ShippingFeeCalculator::new(
            config.shipping.flat_fee,
            config.shipping.free_threshold,
        ))
    }

    /// Prices `context`, advancing its running totals as each calculator runs.
    ///
    /// Applicability is checked right before each calculator runs, against the
    /// context as the previous calculators left it.
    pub fn calculate(&self, context: &mut CalculationContext) -> Result<PriceResult, PricingError> {
        let mut result = PriceResult::default();

        for calculator in &self.calculators {
            if !calculator.supports(context) {
                continue;
            }

            let step = calculator.calculate(context)?;
            debug!(
                event_name = "checkout.pricing.calculator_applied",
                calculator = calculator.calculator_type(),
                user_id = %context.user(),
                base_amount = %step.base_amount,
                discount_amount = %step.discount_amount,
                shipping_fee = %step.shipping_fee,
                "price calculator applied"
            );
            context.absorb(&step);
            result.absorb(step);
        }

        Ok(result.finalize())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::{
        BasePriceCalculator, CalculationContext, PriceCalculationService, PriceCalculator,
        PriceResult,
    };
    use crate::config::{FullReductionRule, PointsConfig, PricingConfig, ShippingConfig};
    use crate::domain::item::{CheckoutItem, CheckoutItemId, Sku, SkuId};
    use crate::domain::user::UserId;
    use crate::errors::PricingError;
    use crate::promotion::PromotionRecord;

    fn item(row: &str, price: i64, quantity: u32, selected: bool) -> CheckoutItem {
        let sku_id = SkuId(format!("sku-{row}"));
        CheckoutItem::new(
            CheckoutItemId(row.to_owned()),
            sku_id.clone(),
            quantity,
            selected,
            Some(Sku { id: sku_id, name: row.to_owned(), unit_price: Some(Decimal::new(price, 2)) }),
        )
        .expect("valid item")
    }

    fn context(items: Vec<CheckoutItem>) -> CalculationContext {
        CalculationContext::new(UserId("user-1".to_owned()), items)
    }

    struct RecordingCalculator {
        name: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PriceCalculator for RecordingCalculator {
        fn calculator_type(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn supports(&self, _context: &CalculationContext) -> bool {
            true
        }

        fn calculate(&self, _context: &CalculationContext) -> Result<PriceResult, PricingError> {
            self.log.lock().expect("log lock").push(self.name);
            Ok(PriceResult::default())
        }
    }

    struct FlatDiscount(Decimal);

    impl PriceCalculator for FlatDiscount {
        fn calculator_type(&self) -> &str {
            "flat_discount"
        }

        fn priority(&self) -> i32 {
            10
        }

        fn supports(&self, context: &CalculationContext) -> bool {
            !context.has_promotion("flat")
        }

        fn calculate(&self, _context: &CalculationContext) -> Result<PriceResult, PricingError> {
            let mut promotions = BTreeMap::new();
            promotions.insert(
                "flat".to_owned(),
                PromotionRecord {
                    promotion_type: "flat".to_owned(),
                    description: "flat discount".to_owned(),
                    threshold: Decimal::ZERO,
                    reduction: self.0,
                    applied_amount: Decimal::ZERO,
                },
            );
            Ok(PriceResult::discount(self.0, promotions, "flat", "flat discount"))
        }
    }

    struct Failing;

    impl PriceCalculator for Failing {
        fn calculator_type(&self) -> &str {
            "failing"
        }

        fn priority(&self) -> i32 {
            0
        }

        fn supports(&self, _context: &CalculationContext) -> bool {
            true
        }

        fn calculate(&self, _context: &CalculationContext) -> Result<PriceResult, PricingError> {
            Err(PricingError::CalculatorFailed {
                calculator: "failing".to_owned(),
                message: "misconfigured".to_owned(),
            })
        }
    }

    #[test]
    fn runs_in_descending_priority_with_stable_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recording = |name, priority| RecordingCalculator { name, priority, log: log.clone() };

        let service = PriceCalculationService::new()
            .with_calculator(recording("low", 1))
            .with_calculator(recording("tie-a", 5))
            .with_calculator(recording("high", 9))
            .with_calculator(recording("tie-b", 5));

        assert_eq!(service.calculator_types(), vec!["high", "tie-a", "tie-b", "low"]);

        let mut ctx = context(vec![item("a", 1000, 1, true)]);
        service.calculate(&mut ctx).expect("pricing succeeds");
        assert_eq!(*log.lock().expect("log lock"), vec!["high", "tie-a", "tie-b", "low"]);
    }

    #[test]
    fn final_amount_is_base_minus_discount_clamped_at_zero() {
        let service = PriceCalculationService::new()
            .with_calculator(BasePriceCalculator)
            .with_calculator(FlatDiscount(Decimal::new(5000, 2)));

        let mut ctx = context(vec![item("a", 2000, 1, true)]);
        let result = service.calculate(&mut ctx).expect("pricing succeeds");

        assert_eq!(result.base_amount, Decimal::new(2000, 2));
        assert_eq!(result.discount_amount, Decimal::new(5000, 2));
        assert_eq!(result.final_amount, Decimal::ZERO);
        assert_eq!(result.payable_amount, Decimal::ZERO);
        assert!(result.applied_promotions.contains_key("flat"));
        assert!(ctx.has_promotion("flat"));
        assert_eq!(ctx.subtotal(), Decimal::new(2000, 2));
        assert_eq!(result.trace.len(), 2);
    }

    #[test]
    fn calculator_failure_is_fatal() {
        let service =
            PriceCalculationService::new().with_calculator(BasePriceCalculator).with_calculator(Failing);

        let mut ctx = context(vec![item("a", 2000, 1, true)]);
        let error = service.calculate(&mut ctx).expect_err("failure propagates");
        assert!(matches!(error, PricingError::CalculatorFailed { .. }));
    }

    #[test]
    fn config_chain_orders_standard_calculators() {
        let config = PricingConfig {
            currency: "CNY".to_owned(),
            full_reduction: vec![FullReductionRule {
                key: "full_reduction".to_owned(),
                threshold: Decimal::new(10_000, 2),
                reduction: Decimal::new(1000, 2),
                priority: 0,
            }],
            shipping: ShippingConfig {
                flat_fee: Decimal::new(800, 2),
                free_threshold: Some(Decimal::new(9900, 2)),
            },
            points: PointsConfig { points_per_unit: 100 },
        };

        let service = PriceCalculationService::from_config(&config);
        assert_eq!(
            service.calculator_types(),
            vec!["base", "promotion", "coupon", "points", "shipping"]
        );

        let mut ctx = context(vec![item("a", 6000, 2, true), item("b", 999, 1, false)]);
        let result = service.calculate(&mut ctx).expect("pricing succeeds");
        assert_eq!(result.base_amount, Decimal::new(12_000, 2));
        assert_eq!(result.discount_amount, Decimal::new(1000, 2));
        assert_eq!(result.final_amount, Decimal::new(11_000, 2));
        assert_eq!(result.shipping_fee, Decimal::ZERO);
        assert_eq!(result.payable_amount, Decimal::new(11_000, 2));
    }

    proptest! {
        #[test]
        fn unselected_carts_price_at_zero(
            lines in prop::collection::vec((1i64..=1_000_000, 1u32..=50), 0..12)
        ) {
            let items = lines
                .iter()
                .enumerate()
                .map(|(index, (price, quantity))| item(&format!("row-{index}"), *price, *quantity, false))
                .collect::<Vec<_>>();
            let service = PriceCalculationService::new().with_calculator(BasePriceCalculator);
            let mut ctx = context(items);
            let result = service.calculate(&mut ctx).expect("pricing succeeds");
            prop_assert_eq!(result.base_amount, Decimal::ZERO);
            prop_assert_eq!(result.final_amount, Decimal::ZERO);
        }

        #[test]
        fn final_amount_is_never_negative(
            lines in prop::collection::vec((1i64..=100_000, 1u32..=10, any::<bool>()), 0..8),
            discounts in prop::collection::vec(0i64..=500_000, 0..4)
        ) {
            let items = lines
                .iter()
                .enumerate()
                .map(|(index, (price, quantity, selected))| {
                    item(&format!("row-{index}"), *price, *quantity, *selected)
                })
                .collect::<Vec<_>>();
            let mut service = PriceCalculationService::new().with_calculator(BasePriceCalculator);
            for cents in &discounts {
                service = service.with_calculator(FlatDiscount(Decimal::new(*cents, 2)));
            }
            let mut ctx = context(items);
            let result = service.calculate(&mut ctx).expect("pricing succeeds");
            prop_assert!(result.final_amount >= Decimal::ZERO);
            let expected = (result.base_amount - result.discount_amount).max(Decimal::ZERO);
            prop_assert_eq!(result.final_amount, expected);
        }

        #[test]
        fn equal_priorities_keep_registration_order(priorities in prop::collection::vec(0i32..3, 1..8)) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let names = ["c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7"];
            let mut service = PriceCalculationService::new();
            for (index, priority) in priorities.iter().enumerate() {
                service = service.with_calculator(RecordingCalculator {
                    name: names[index],
                    priority: *priority,
                    log: log.clone(),
                });
            }

            let mut expected = priorities.iter().copied().zip(names).collect::<Vec<_>>();
            expected.sort_by(|left, right| right.0.cmp(&left.0));
            let expected = expected.into_iter().map(|(_, name)| name).collect::<Vec<_>>();

            let mut ctx = context(Vec::new());
            service.calculate(&mut ctx).expect("pricing succeeds");
            prop_assert_eq!(log.lock().expect("log lock").clone(), expected);
        }
    }
}
