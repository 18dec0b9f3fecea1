//! Dry-run pricing of a cart described in a JSON file.
//!
//! The file carries its own catalog and coupons, so pricing never touches the
//! configured database. Only the pricing rules come from configuration.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use checkout_core::checkout::{CheckoutPreview, CheckoutRequest, CheckoutService};
use checkout_core::config::PricingConfig;
use checkout_core::coupon::CouponProviderChain;
use checkout_core::domain::coupon::Coupon;
use checkout_core::domain::item::{CartLine, Sku, SkuId};
use checkout_core::domain::user::UserId;
use checkout_core::pricing::PriceCalculationService;
use checkout_db::{
    CouponRepository, InMemoryCouponRepository, InMemorySkuRepository, LocalCouponProvider,
    SkuRepository,
};

use crate::commands::{load_config, runtime, CommandResult, EXIT_INVALID_INPUT};

#[derive(Debug, Deserialize)]
pub struct CartFile {
    pub user: UserId,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub skus: Vec<CartSku>,
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub coupons: Vec<CartCoupon>,
}

#[derive(Debug, Deserialize)]
pub struct CartSku {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
}

/// A coupon held by the cart's user.
#[derive(Debug, Deserialize)]
pub struct CartCoupon {
    pub code: String,
    pub discount_amount: Decimal,
    #[serde(default)]
    pub threshold: Option<Decimal>,
}

#[derive(Debug, Serialize)]
struct PriceReport<'a> {
    can_place_order: bool,
    #[serde(flatten)]
    preview: &'a CheckoutPreview,
}

pub fn run(cart: &Path, coupon: Option<String>, user: Option<String>) -> CommandResult {
    let config = match load_config("price") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let mut cart_file = match load_cart(cart) {
        Ok(cart_file) => cart_file,
        Err(error) => {
            return CommandResult::failure(
                "price",
                "invalid_input",
                format!("{error:#}"),
                EXIT_INVALID_INPUT,
            )
        }
    };
    if let Some(code) = coupon {
        cart_file.coupon_code = Some(code);
    }
    if let Some(user) = user {
        cart_file.user = UserId(user);
    }

    let runtime = match runtime("price") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(price_cart(&config.pricing, cart_file)) {
        Ok(preview) => {
            let message = summarize(&preview, &config.pricing.currency);
            let report = PriceReport { can_place_order: preview.can_place_order(), preview: &preview };
            CommandResult::report("price", message, &report)
        }
        Err(error) => CommandResult::application_failure("price", error),
    }
}

pub fn load_cart(path: &Path) -> anyhow::Result<CartFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read cart file `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("could not parse cart file `{}`", path.display()))
}

/// Prices the cart against an in-memory catalog built from the file.
pub async fn price_cart(
    pricing: &PricingConfig,
    cart: CartFile,
) -> Result<CheckoutPreview, checkout_core::errors::ApplicationError> {
    let catalog = Arc::new(InMemorySkuRepository::default());
    for sku in cart.skus {
        let id = SkuId(sku.id);
        let name = if sku.name.is_empty() { id.0.clone() } else { sku.name };
        catalog.save(Sku { id, name, unit_price: sku.unit_price }, sku.stock).await?;
    }

    let coupons = InMemoryCouponRepository::default();
    for (index, coupon) in cart.coupons.into_iter().enumerate() {
        coupons
            .save(Coupon {
                id: format!("cart-coupon-{}", index + 1),
                code: coupon.code,
                owner: cart.user.clone(),
                valid: true,
                locked: false,
                discount_amount: coupon.discount_amount,
                threshold: coupon.threshold,
                metadata: Default::default(),
                redeemed_at: None,
            })
            .await?;
    }

    let service = CheckoutService::new(
        catalog.clone(),
        catalog,
        PriceCalculationService::from_config(pricing),
        CouponProviderChain::new().with_provider(LocalCouponProvider::new(coupons)),
    );

    let request = CheckoutRequest {
        user: cart.user,
        lines: cart.lines,
        coupon_code: cart.coupon_code,
        points: cart.points,
    };
    service.preview(&request).await
}

fn summarize(preview: &CheckoutPreview, currency: &str) -> String {
    let price = &preview.price;
    let mut message = format!(
        "payable {} {currency} (base {}, discount {}, shipping {})",
        price.payable_amount, price.base_amount, price.discount_amount, price.shipping_fee
    );
    if let Some(code) = preview.coupon_code.as_deref().filter(|_| !preview.coupon_resolved) {
        message.push_str(&format!("; coupon `{code}` not found"));
    } else if let Some(code) = preview.coupon_code.as_deref().filter(|_| !preview.coupon_applied) {
        message.push_str(&format!("; coupon `{code}` does not apply to this cart"));
    }
    if !preview.shortages.is_empty() {
        let skus = preview.shortages.iter().map(|s| s.sku_id.0.as_str()).collect::<Vec<_>>();
        message.push_str(&format!("; insufficient stock for {}", skus.join(", ")));
    }
    message
}
