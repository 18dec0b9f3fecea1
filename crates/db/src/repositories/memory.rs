use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use checkout_core::checkout::{SkuCatalog, StockService};
use checkout_core::domain::coupon::{Coupon, CouponMetadata, CouponState};
use checkout_core::domain::item::{Sku, SkuId};
use checkout_core::domain::user::UserId;
use checkout_core::errors::ApplicationError;

use super::{CouponRepository, RepositoryError, SkuRepository};

type CouponKey = (String, String);

fn key(code: &str, owner: &UserId) -> CouponKey {
    (owner.0.clone(), code.to_owned())
}

/// Coupon store for tests and dry runs. The write lock makes every
/// conditional update atomic.
#[derive(Default)]
pub struct InMemoryCouponRepository {
    coupons: RwLock<HashMap<CouponKey, Coupon>>,
}

#[async_trait::async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn find_active(
        &self,
        code: &str,
        owner: &UserId,
    ) -> Result<Option<Coupon>, RepositoryError> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(&key(code, owner)).filter(|coupon| coupon.valid).cloned())
    }

    async fn find_by_code(
        &self,
        code: &str,
        owner: &UserId,
    ) -> Result<Option<Coupon>, RepositoryError> {
        let coupons = self.coupons.read().await;
        Ok(coupons.get(&key(code, owner)).cloned())
    }

    async fn try_lock(&self, code: &str, owner: &UserId) -> Result<bool, RepositoryError> {
        let mut coupons = self.coupons.write().await;
        Ok(coupons.get_mut(&key(code, owner)).is_some_and(Coupon::lock))
    }

    async fn release_lock(&self, code: &str, owner: &UserId) -> Result<bool, RepositoryError> {
        let mut coupons = self.coupons.write().await;
        Ok(coupons
            .get_mut(&key(code, owner))
            .filter(|coupon| coupon.state() == CouponState::Locked)
            .is_some_and(Coupon::unlock))
    }

    async fn mark_redeemed(
        &self,
        code: &str,
        owner: &UserId,
        metadata: &CouponMetadata,
        redeemed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut coupons = self.coupons.write().await;
        Ok(coupons
            .get_mut(&key(code, owner))
            .is_some_and(|coupon| coupon.redeem(metadata.clone(), redeemed_at)))
    }

    async fn save(&self, coupon: Coupon) -> Result<(), RepositoryError> {
        let key = key(&coupon.code, &coupon.owner);
        let mut coupons = self.coupons.write().await;
        coupons.retain(|stored_key, stored| stored.id != coupon.id || *stored_key == key);
        coupons.insert(key, coupon);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySkuRepository {
    skus: RwLock<HashMap<String, (Sku, u32)>>,
}

#[async_trait::async_trait]
impl SkuRepository for InMemorySkuRepository {
    async fn find_by_id(&self, id: &SkuId) -> Result<Option<Sku>, RepositoryError> {
        let skus = self.skus.read().await;
        Ok(skus.get(&id.0).map(|(sku, _)| sku.clone()))
    }

    async fn stock_of(&self, id: &SkuId) -> Result<u32, RepositoryError> {
        let skus = self.skus.read().await;
        Ok(skus.get(&id.0).map(|(_, stock)| *stock).unwrap_or_default())
    }

    async fn save(&self, sku: Sku, stock: u32) -> Result<(), RepositoryError> {
        let mut skus = self.skus.write().await;
        skus.insert(sku.id.0.clone(), (sku, stock));
        Ok(())
    }
}

#[async_trait::async_trait]
impl SkuCatalog for InMemorySkuRepository {
    async fn find_sku(&self, sku_id: &SkuId) -> Result<Option<Sku>, ApplicationError> {
        Ok(self.find_by_id(sku_id).await?)
    }
}

#[async_trait::async_trait]
impl StockService for InMemorySkuRepository {
    async fn available_stock(&self, sku_id: &SkuId) -> Result<u32, ApplicationError> {
        Ok(self.stock_of(sku_id).await?)
    }
}
