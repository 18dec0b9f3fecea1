use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::coupon::{CouponProvider, CouponResolver};
use crate::domain::coupon::{Coupon, CouponMetadata};
use crate::domain::user::UserId;

/// Single entry point for coupon codes, whatever system issued them.
///
/// Lookups walk the supporting providers in registration order and fall back
/// to the resolver. Lifecycle operations go to the first provider whose
/// `supports` accepts the code and nowhere else. Every operation is fail-soft:
/// provider faults are logged and reported as a negative result.
#[derive(Clone, Default)]
pub struct CouponProviderChain {
    providers: Vec<Arc<dyn CouponProvider>>,
    fallback: Option<Arc<dyn CouponResolver>>,
}

impl CouponProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl CouponProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn register(&mut self, provider: Arc<dyn CouponProvider>) {
        self.providers.push(provider);
    }

    pub fn with_fallback(mut self, resolver: impl CouponResolver + 'static) -> Self {
        self.fallback = Some(Arc::new(resolver));
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|provider| provider.name().to_owned()).collect()
    }

    /// The provider that owns `code`, if any.
    pub fn route(&self, code: &str) -> Option<&Arc<dyn CouponProvider>> {
        self.providers.iter().find(|provider| provider.supports(code))
    }

    pub async fn find_by_code(&self, code: &str, user: &UserId) -> Option<Coupon> {
        self.find_by_code_with(code, user, self.fallback.as_deref()).await
    }

    /// Like [`Self::find_by_code`] with an explicit fallback for this call only.
    pub async fn find_by_code_with(
        &self,
        code: &str,
        user: &UserId,
        fallback: Option<&dyn CouponResolver>,
    ) -> Option<Coupon> {
        for provider in self.providers.iter().filter(|provider| provider.supports(code)) {
            match provider.find_by_code(code, user).await {
                Ok(Some(coupon)) => {
                    debug!(
                        event_name = "checkout.coupon.resolved",
                        provider = provider.name(),
                        code,
                        user_id = %user,
                        "coupon resolved by provider"
                    );
                    return Some(coupon);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        event_name = "checkout.coupon.provider_failed",
                        operation = "find",
                        provider = provider.name(),
                        code,
                        user_id = %user,
                        error = %error,
                        "coupon provider failed; treating as not found"
                    );
                }
            }
        }

        let resolver = fallback?;
        match resolver.resolve(code, user).await {
            Ok(found) => {
                debug!(
                    event_name = "checkout.coupon.fallback_consulted",
                    code,
                    user_id = %user,
                    resolved = found.is_some(),
                    "coupon fallback resolver consulted"
                );
                found
            }
            Err(error) => {
                warn!(
                    event_name = "checkout.coupon.fallback_failed",
                    code,
                    user_id = %user,
                    error = %error,
                    "coupon fallback resolver failed"
                );
                None
            }
        }
    }

    pub async fn lock(&self, code: &str, user: &UserId) -> bool {
        let Some(provider) = self.route(code) else {
            debug!(
                event_name = "checkout.coupon.unrouted",
                operation = "lock",
                code,
                "no provider supports coupon code"
            );
            return false;
        };

        match provider.lock(code, user).await {
            Ok(locked) => {
                info!(
                    event_name = "checkout.coupon.lock",
                    provider = provider.name(),
                    code,
                    user_id = %user,
                    locked,
                    "coupon lock attempted"
                );
                locked
            }
            Err(err) => {
                error!(
                    event_name = "checkout.coupon.provider_failed",
                    operation = "lock",
                    provider = provider.name(),
                    code,
                    user_id = %user,
                    error = %err,
                    "coupon lock failed"
                );
                false
            }
        }
    }

    pub async fn unlock(&self, code: &str, user: &UserId) -> bool {
        let Some(provider) = self.route(code) else {
            debug!(
                event_name = "checkout.coupon.unrouted",
                operation = "unlock",
                code,
                "no provider supports coupon code"
            );
            return false;
        };

        match provider.unlock(code, user).await {
            Ok(unlocked) => {
                info!(
                    event_name = "checkout.coupon.unlock",
                    provider = provider.name(),
                    code,
                    user_id = %user,
                    unlocked,
                    "coupon unlock attempted"
                );
                unlocked
            }
            Err(err) => {
                error!(
                    event_name = "checkout.coupon.provider_failed",
                    operation = "unlock",
                    provider = provider.name(),
                    code,
                    user_id = %user,
                    error = %err,
                    "coupon unlock failed"
                );
                false
            }
        }
    }

    pub async fn redeem(&self, code: &str, user: &UserId, metadata: CouponMetadata) -> bool {
        let Some(provider) = self.route(code) else {
            debug!(
                event_name = "checkout.coupon.unrouted",
                operation = "redeem",
                code,
                "no provider supports coupon code"
            );
            return false;
        };

        match provider.redeem(code, user, metadata).await {
            Ok(redeemed) => {
                info!(
                    event_name = "checkout.coupon.redeem",
                    provider = provider.name(),
                    code,
                    user_id = %user,
                    redeemed,
                    "coupon redemption attempted"
                );
                redeemed
            }
            Err(err) => {
                error!(
                    event_name = "checkout.coupon.provider_failed",
                    operation = "redeem",
                    provider = provider.name(),
                    code,
                    user_id = %user,
                    error = %err,
                    "coupon redemption failed"
                );
                false
            }
        }
    }
}
