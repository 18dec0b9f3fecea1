//! Request-level orchestration around the pricing pipeline.
//!
//! The service owns no state of its own. Catalog, stock, points and order
//! storage are collaborators behind traits; coupons go through the provider
//! chain, which never fails a request on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::coupon::CouponProviderChain;
use crate::domain::coupon::CouponMetadata;
use crate::domain::item::{CartLine, CheckoutItem, Sku, SkuId};
use crate::domain::user::UserId;
use crate::errors::{ApplicationError, DomainError};
use crate::pricing::coupon::COUPON_PROMOTION_KEY;
use crate::pricing::{CalculationContext, PriceCalculationService, PriceResult};

#[async_trait]
pub trait SkuCatalog: Send + Sync {
    /// `Ok(None)` for an unknown SKU. Missing prices are expressed through
    /// `Sku::unit_price`, never as an error.
    async fn find_sku(&self, sku_id: &SkuId) -> Result<Option<Sku>, ApplicationError>;
}

#[async_trait]
pub trait StockService: Send + Sync {
    async fn available_stock(&self, sku_id: &SkuId) -> Result<u32, ApplicationError>;

    async fn check_availability(
        &self,
        sku_id: &SkuId,
        quantity: u32,
    ) -> Result<bool, ApplicationError> {
        Ok(self.available_stock(sku_id).await? >= quantity)
    }
}

/// Loyalty points ledger. `reference` ties a refund to its deduction.
#[async_trait]
pub trait IntegralService: Send + Sync {
    async fn deduct(
        &self,
        user: &UserId,
        points: u32,
        reference: &str,
    ) -> Result<(), ApplicationError>;

    async fn refund(
        &self,
        user: &UserId,
        points: u32,
        reference: &str,
    ) -> Result<(), ApplicationError>;
}

#[async_trait]
pub trait OrderWriter: Send + Sync {
    async fn create_order(&self, draft: &OrderDraft) -> Result<OrderId, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user: UserId,
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub points: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub sku_id: SkuId,
    pub requested: u32,
    pub available: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPreview {
    pub price: PriceResult,
    pub coupon_code: Option<String>,
    /// False when a code was given but no provider knew it.
    pub coupon_resolved: bool,
    /// True when the resolved coupon actually discounted this cart.
    pub coupon_applied: bool,
    pub shortages: Vec<StockShortage>,
}

impl CheckoutPreview {
    pub fn can_place_order(&self) -> bool {
        self.shortages.is_empty() && (self.coupon_code.is_none() || self.coupon_applied)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub reference: String,
    pub user: UserId,
    pub items: Vec<CheckoutItem>,
    pub coupon_code: Option<String>,
    pub price: PriceResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub reference: String,
    pub price: PriceResult,
    pub coupon_code: Option<String>,
    pub coupon_redeemed: bool,
}

/// What `place_order` has reserved so far and must give back on failure.
#[derive(Debug, Default)]
struct Reservation {
    locked_coupon: Option<String>,
    deducted_points: u32,
}

#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn SkuCatalog>,
    stock: Arc<dyn StockService>,
    pricing: PriceCalculationService,
    coupons: CouponProviderChain,
    integral: Option<Arc<dyn IntegralService>>,
    orders: Option<Arc<dyn OrderWriter>>,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn SkuCatalog>,
        stock: Arc<dyn StockService>,
        pricing: PriceCalculationService,
        coupons: CouponProviderChain,
    ) -> Self {
        Self { catalog, stock, pricing, coupons, integral: None, orders: None }
    }

    pub fn with_integral(mut self, integral: Arc<dyn IntegralService>) -> Self {
        self.integral = Some(integral);
        self
    }

    pub fn with_order_writer(mut self, orders: Arc<dyn OrderWriter>) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn coupons(&self) -> &CouponProviderChain {
        &self.coupons
    }

    /// Validates every line before touching the catalog, then resolves SKUs
    /// in request order. An unknown SKU prices at zero.
    pub async fn build_context(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CalculationContext, ApplicationError> {
        if request.lines.is_empty() {
            return Err(DomainError::EmptyCheckout.into());
        }

        for line in &request.lines {
            CheckoutItem::from_line(line.clone(), None)?;
        }

        let mut items = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let sku = self.catalog.find_sku(&line.sku_id).await?;
            if sku.is_none() {
                warn!(
                    event_name = "checkout.catalog.sku_missing",
                    sku_id = %line.sku_id.0,
                    item_id = %line.id.0,
                    "sku not found in catalog; pricing item at zero"
                );
            }
            items.push(CheckoutItem::from_line(line.clone(), sku)?);
        }

        Ok(CalculationContext::new(request.user.clone(), items).with_points(request.points))
    }

    /// Shortages for selected items, with quantities summed per SKU.
    pub async fn check_stock(
        &self,
        context: &CalculationContext,
    ) -> Result<Vec<StockShortage>, ApplicationError> {
        let mut requested: BTreeMap<&SkuId, u32> = BTreeMap::new();
        for item in context.selected_items() {
            let quantity = requested.entry(item.sku_id()).or_default();
            *quantity = quantity.saturating_add(item.quantity());
        }

        let mut shortages = Vec::new();
        for (sku_id, quantity) in requested {
            if self.stock.check_availability(sku_id, quantity).await? {
                continue;
            }
            let available = self.stock.available_stock(sku_id).await?;
            shortages.push(StockShortage { sku_id: sku_id.clone(), requested: quantity, available });
        }

        Ok(shortages)
    }

    /// Prices the request without reserving anything.
    pub async fn preview(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutPreview, ApplicationError> {
        let context = self.build_context(request).await?;

        let coupon = match request.coupon_code.as_deref() {
            Some(code) => self.coupons.find_by_code(code, &request.user).await,
            None => None,
        };
        let coupon_resolved = coupon.is_some();

        let mut context = context.with_coupon(coupon);
        let price = self.pricing.calculate(&mut context)?;
        let coupon_applied = context.has_promotion(COUPON_PROMOTION_KEY);
        let shortages = self.check_stock(&context).await?;

        Ok(CheckoutPreview {
            price,
            coupon_code: request.coupon_code.clone(),
            coupon_resolved,
            coupon_applied,
            shortages,
        })
    }

    /// Reserves the coupon, prices, deducts points and writes the order.
    ///
    /// Anything reserved before a failure is released again: the coupon is
    /// unlocked and deducted points are refunded before the error returns.
    pub async fn place_order(
        &self,
        request: &CheckoutRequest,
    ) -> Result<PlacedOrder, ApplicationError> {
        let context = self.build_context(request).await?;
        if !context.has_selected_items() {
            return Err(DomainError::EmptyCheckout.into());
        }

        if let Some(shortage) = self.check_stock(&context).await?.into_iter().next() {
            return Err(DomainError::InsufficientStock {
                sku_id: shortage.sku_id,
                requested: shortage.requested,
                available: shortage.available,
            }
            .into());
        }

        let mut reservation = Reservation::default();
        let coupon = match request.coupon_code.as_deref() {
            Some(code) => {
                let unavailable = || DomainError::CouponUnavailable { code: code.to_owned() };
                let coupon = self
                    .coupons
                    .find_by_code(code, &request.user)
                    .await
                    .ok_or_else(unavailable)?;
                if !self.coupons.lock(code, &request.user).await {
                    return Err(unavailable().into());
                }
                reservation.locked_coupon = Some(code.to_owned());
                Some(coupon)
            }
            None => None,
        };

        let reference = Uuid::new_v4().to_string();
        let mut context = context.with_coupon(coupon);
        match self.commit(request, &mut context, &reference, &mut reservation).await {
            Ok(placed) => Ok(placed),
            Err(err) => {
                warn!(
                    event_name = "checkout.order.rolled_back",
                    user_id = %request.user,
                    reference = %reference,
                    error = %err,
                    "order placement failed; releasing reservations"
                );
                self.release(&request.user, &reference, &reservation).await;
                Err(err)
            }
        }
    }

    async fn commit(
        &self,
        request: &CheckoutRequest,
        context: &mut CalculationContext,
        reference: &str,
        reservation: &mut Reservation,
    ) -> Result<PlacedOrder, ApplicationError> {
        let orders = self.orders.as_ref().ok_or_else(|| {
            ApplicationError::Configuration("no order writer is configured".to_owned())
        })?;

        let price = self.pricing.calculate(context)?;

        // A locked coupon is only redeemed when it discounted this order.
        if let Some(code) = &reservation.locked_coupon {
            if !context.has_promotion(COUPON_PROMOTION_KEY) {
                debug!(
                    event_name = "checkout.order.coupon_not_applicable",
                    code = %code,
                    user_id = %request.user,
                    "locked coupon did not apply to the cart"
                );
                return Err(DomainError::CouponUnavailable { code: code.clone() }.into());
            }
        }

        if price.points_used > 0 {
            let integral = self.integral.as_ref().ok_or_else(|| {
                ApplicationError::Configuration("no points service is configured".to_owned())
            })?;
            integral.deduct(&request.user, price.points_used, reference).await.map_err(
                |err| match err {
                    ApplicationError::Domain(_) => err,
                    other => ApplicationError::Integration(format!("points deduction: {other}")),
                },
            )?;
            reservation.deducted_points = price.points_used;
        }

        let draft = OrderDraft {
            reference: reference.to_owned(),
            user: request.user.clone(),
            items: context.items().to_vec(),
            coupon_code: reservation.locked_coupon.clone(),
            price,
        };
        let order_id = orders.create_order(&draft).await?;

        let coupon_redeemed = match &reservation.locked_coupon {
            Some(code) => {
                let mut metadata = CouponMetadata::new();
                metadata.insert("order_id".to_owned(), json!(order_id.0));
                metadata.insert("user_id".to_owned(), json!(request.user.0));
                let redeemed = self.coupons.redeem(code, &request.user, metadata).await;
                if !redeemed {
                    error!(
                        event_name = "checkout.order.coupon_redeem_failed",
                        order_id = %order_id,
                        code = %code,
                        user_id = %request.user,
                        "order written but coupon was not redeemed"
                    );
                }
                redeemed
            }
            None => false,
        };

        info!(
            event_name = "checkout.order.placed",
            order_id = %order_id,
            user_id = %request.user,
            payable_amount = %draft.price.payable_amount,
            points_used = draft.price.points_used,
            coupon_redeemed,
            "order placed"
        );

        Ok(PlacedOrder {
            order_id,
            reference: draft.reference,
            price: draft.price,
            coupon_code: draft.coupon_code,
            coupon_redeemed,
        })
    }

    async fn release(&self, user: &UserId, reference: &str, reservation: &Reservation) {
        if let Some(code) = &reservation.locked_coupon {
            if !self.coupons.unlock(code, user).await {
                error!(
                    event_name = "checkout.order.coupon_unlock_failed",
                    code = %code,
                    user_id = %user,
                    "coupon stayed locked after a failed order"
                );
            }
        }

        if reservation.deducted_points == 0 {
            return;
        }
        let Some(integral) = &self.integral else {
            return;
        };
        if let Err(err) = integral.refund(user, reservation.deducted_points, reference).await {
            error!(
                event_name = "checkout.order.points_refund_failed",
                user_id = %user,
                reference = %reference,
                points = reservation.deducted_points,
                error = %err,
                "points were not refunded after a failed order"
            );
        }
    }
}
