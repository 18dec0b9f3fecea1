use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use checkout_core::coupon::CouponProvider;
use checkout_core::domain::coupon::{Coupon, CouponMetadata, CouponState};
use checkout_core::domain::user::UserId;
use checkout_core::errors::CouponError;

use crate::repositories::{CouponRepository, RepositoryError};

pub const LOCAL_PROVIDER_NAME: &str = "local";

/// Coupons issued by this shop, stored through a [`CouponRepository`].
///
/// Locks taken through this instance are remembered in a process-local set.
/// The repository's `locked` flag stays authoritative: `lock` always goes
/// through its conditional update and [`Self::is_locked`] confirms every
/// cached entry against it.
pub struct LocalCouponProvider<R> {
    repository: R,
    code_prefix: Option<String>,
    locked: RwLock<HashSet<(String, String)>>,
}

impl<R: CouponRepository> LocalCouponProvider<R> {
    pub fn new(repository: R) -> Self {
        Self { repository, code_prefix: None, locked: RwLock::new(HashSet::new()) }
    }

    /// Claims only codes starting with `prefix`.
    pub fn with_code_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.code_prefix = Some(prefix.into());
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Whether the coupon is currently reserved.
    ///
    /// A cached entry is only a hint: the store is always asked, and an entry
    /// it contradicts is evicted, so another instance unlocking or redeeming
    /// the coupon is seen here on the next call.
    pub async fn is_locked(&self, code: &str, user: &UserId) -> Result<bool, CouponError> {
        let key = cache_key(code, user);
        let cached = self.locked.read().await.contains(&key);

        let locked = self
            .repository
            .find_active(code, user)
            .await?
            .is_some_and(|coupon| coupon.state() == CouponState::Locked);

        match (cached, locked) {
            (false, true) => {
                self.locked.write().await.insert(key);
            }
            (true, false) => {
                debug!(
                    event_name = "checkout.coupon.local.cache_evicted",
                    code,
                    user_id = %user,
                    "cached lock no longer held in the store"
                );
                self.locked.write().await.remove(&key);
            }
            _ => {}
        }
        Ok(locked)
    }

    async fn forget(&self, code: &str, user: &UserId) {
        self.locked.write().await.remove(&cache_key(code, user));
    }

    fn store_failed(&self, operation: &str, code: &str, user: &UserId, err: &RepositoryError) {
        error!(
            event_name = "checkout.coupon.local.store_failed",
            operation,
            code,
            user_id = %user,
            error = %err,
            "local coupon store failed"
        );
    }
}

fn cache_key(code: &str, user: &UserId) -> (String, String) {
    (user.0.clone(), code.to_owned())
}

#[async_trait]
impl<R: CouponRepository> CouponProvider for LocalCouponProvider<R> {
    fn name(&self) -> &str {
        LOCAL_PROVIDER_NAME
    }

    fn supports(&self, code: &str) -> bool {
        self.code_prefix.as_deref().map_or(true, |prefix| code.starts_with(prefix))
    }

    async fn find_by_code(
        &self,
        code: &str,
        user: &UserId,
    ) -> Result<Option<Coupon>, CouponError> {
        Ok(self.repository.find_active(code, user).await?)
    }

    async fn lock(&self, code: &str, user: &UserId) -> Result<bool, CouponError> {
        match self.repository.try_lock(code, user).await {
            Ok(true) => {
                self.locked.write().await.insert(cache_key(code, user));
                Ok(true)
            }
            Ok(false) => {
                debug!(
                    event_name = "checkout.coupon.local.lock_refused",
                    code,
                    user_id = %user,
                    "coupon is missing, spent or already locked"
                );
                Ok(false)
            }
            Err(err) => {
                self.store_failed("lock", code, user, &err);
                Ok(false)
            }
        }
    }

    async fn unlock(&self, code: &str, user: &UserId) -> Result<bool, CouponError> {
        self.forget(code, user).await;

        match self.repository.release_lock(code, user).await {
            Ok(true) => Ok(true),
            // nothing was locked; only a spent coupon reports failure
            Ok(false) => match self.repository.find_by_code(code, user).await {
                Ok(coupon) => {
                    Ok(coupon.map_or(true, |coupon| coupon.state() != CouponState::Redeemed))
                }
                Err(err) => {
                    self.store_failed("unlock", code, user, &err);
                    Ok(false)
                }
            },
            Err(err) => {
                self.store_failed("unlock", code, user, &err);
                Ok(false)
            }
        }
    }

    async fn redeem(
        &self,
        code: &str,
        user: &UserId,
        metadata: CouponMetadata,
    ) -> Result<bool, CouponError> {
        match self.repository.mark_redeemed(code, user, &metadata, Utc::now()).await {
            Ok(redeemed) => {
                if redeemed {
                    self.forget(code, user).await;
                }
                Ok(redeemed)
            }
            Err(err) => {
                self.store_failed("redeem", code, user, &err);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::json;

    use checkout_core::coupon::{CouponProvider, CouponProviderChain};
    use checkout_core::domain::coupon::{Coupon, CouponMetadata, CouponState};
    use checkout_core::domain::user::UserId;

    use super::LocalCouponProvider;
    use crate::repositories::{CouponRepository, InMemoryCouponRepository, SqlCouponRepository};
    use crate::{connect_with_settings, migrations};

    fn user() -> UserId {
        UserId("user-1".to_string())
    }

    fn coupon(code: &str) -> Coupon {
        Coupon {
            id: format!("id-{code}"),
            code: code.to_string(),
            owner: user(),
            valid: true,
            locked: false,
            discount_amount: Decimal::new(1000, 2),
            threshold: None,
            metadata: CouponMetadata::new(),
            redeemed_at: None,
        }
    }

    async fn provider_with(codes: &[&str]) -> LocalCouponProvider<InMemoryCouponRepository> {
        let repository = InMemoryCouponRepository::default();
        for code in codes {
            repository.save(coupon(code)).await.expect("save coupon");
        }
        LocalCouponProvider::new(repository)
    }

    #[tokio::test]
    async fn lock_rejects_double_locking() {
        let provider = provider_with(&["SAVE10"]).await;

        assert!(provider.lock("SAVE10", &user()).await.expect("lock"));
        assert!(!provider.lock("SAVE10", &user()).await.expect("second lock"));
        assert!(provider.is_locked("SAVE10", &user()).await.expect("is locked"));
    }

    #[tokio::test]
    async fn unlock_is_idempotent_and_tolerates_unknown_codes() {
        let provider = provider_with(&["SAVE10"]).await;

        assert!(provider.unlock("SAVE10", &user()).await.expect("unlock available"));
        assert!(provider.unlock("MISSING", &user()).await.expect("unlock missing"));

        assert!(provider.lock("SAVE10", &user()).await.expect("lock"));
        assert!(provider.unlock("SAVE10", &user()).await.expect("unlock"));
        assert!(provider.unlock("SAVE10", &user()).await.expect("unlock again"));
        assert!(!provider.is_locked("SAVE10", &user()).await.expect("is locked"));
    }

    #[tokio::test]
    async fn redeem_requires_lock_and_leaves_state_untouched_otherwise() {
        let provider = provider_with(&["SAVE10"]).await;
        let mut metadata = CouponMetadata::new();
        metadata.insert("order_id".to_string(), json!("order-1"));

        assert!(!provider.redeem("SAVE10", &user(), metadata.clone()).await.expect("redeem"));
        let stored = provider
            .repository()
            .find_by_code("SAVE10", &user())
            .await
            .expect("find")
            .expect("coupon");
        assert_eq!(stored, coupon("SAVE10"));

        assert!(provider.lock("SAVE10", &user()).await.expect("lock"));
        assert!(provider.redeem("SAVE10", &user(), metadata).await.expect("redeem"));
        assert!(provider.find_by_code("SAVE10", &user()).await.expect("find").is_none());
        assert!(!provider.unlock("SAVE10", &user()).await.expect("unlock spent coupon"));
    }

    #[tokio::test]
    async fn persisted_lock_holds_without_the_cache() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlCouponRepository::new(pool.clone()).save(coupon("SAVE10")).await.expect("save");

        let first = LocalCouponProvider::new(SqlCouponRepository::new(pool.clone()));
        assert!(first.lock("SAVE10", &user()).await.expect("lock"));

        // a fresh instance has an empty cache, as after a restart
        let restarted = LocalCouponProvider::new(SqlCouponRepository::new(pool.clone()));
        assert!(restarted.is_locked("SAVE10", &user()).await.expect("is locked"));
        assert!(!restarted.lock("SAVE10", &user()).await.expect("lock"));
        assert!(restarted.unlock("SAVE10", &user()).await.expect("unlock"));
        assert!(restarted.lock("SAVE10", &user()).await.expect("relock"));

        pool.close().await;
    }

    #[tokio::test]
    async fn unlock_by_another_instance_evicts_the_cached_lock() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlCouponRepository::new(pool.clone()).save(coupon("SAVE10")).await.expect("save");

        let holder = LocalCouponProvider::new(SqlCouponRepository::new(pool.clone()));
        let other = LocalCouponProvider::new(SqlCouponRepository::new(pool.clone()));
        assert!(holder.lock("SAVE10", &user()).await.expect("lock"));

        assert!(other.unlock("SAVE10", &user()).await.expect("unlock"));

        assert!(!holder.is_locked("SAVE10", &user()).await.expect("is locked"));
        assert!(!other.is_locked("SAVE10", &user()).await.expect("is locked"));
        assert!(holder.locked.read().await.is_empty(), "stale entry evicted");

        assert!(other.lock("SAVE10", &user()).await.expect("relock"));
        assert!(other.redeem("SAVE10", &user(), CouponMetadata::new()).await.expect("redeem"));
        assert!(!holder.is_locked("SAVE10", &user()).await.expect("redeemed is not locked"));

        pool.close().await;
    }

    #[tokio::test]
    async fn prefix_routes_codes_through_the_chain() {
        let provider = provider_with(&["LC-SAVE10"]).await.with_code_prefix("LC-");
        assert!(provider.supports("LC-SAVE10"));
        assert!(!provider.supports("EXT-1"));

        let chain = CouponProviderChain::new().with_provider(provider);
        let found = chain.find_by_code("LC-SAVE10", &user()).await.expect("coupon");
        assert_eq!(found.state(), CouponState::Available);
        assert!(chain.lock("LC-SAVE10", &user()).await);
        assert!(chain.redeem("LC-SAVE10", &user(), CouponMetadata::new()).await);
        assert!(!chain.lock("EXT-1", &user()).await);
    }

    #[tokio::test]
    async fn concurrent_locks_through_shared_provider_have_one_winner() {
        let provider = Arc::new(provider_with(&["SAVE10"]).await);
        let attempts = (0..6)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.lock("SAVE10", &user()).await })
            })
            .collect::<Vec<_>>();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.expect("join").expect("lock") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
