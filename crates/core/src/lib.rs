pub mod checkout;
pub mod config;
pub mod coupon;
pub mod domain;
pub mod errors;
pub mod money;
pub mod pricing;
pub mod promotion;

pub use checkout::{
    CheckoutPreview, CheckoutRequest, CheckoutService, IntegralService, OrderDraft, OrderId,
    OrderWriter, PlacedOrder, SkuCatalog, StockService, StockShortage,
};
pub use coupon::{CouponProvider, CouponProviderChain, CouponResolver};
pub use domain::coupon::{Coupon, CouponMetadata, CouponState};
pub use domain::item::{CartLine, CheckoutItem, CheckoutItemId, Sku, SkuId};
pub use domain::user::UserId;
pub use errors::{ApplicationError, CouponError, DomainError, InterfaceError, PricingError};
pub use pricing::{
    CalculationContext, PriceCalculationService, PriceCalculator, PriceResult, PricingTraceStep,
};
pub use promotion::{PromotionMatcher, PromotionRecord, PromotionResult};
