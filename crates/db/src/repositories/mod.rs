use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use checkout_core::domain::coupon::{Coupon, CouponMetadata};
use checkout_core::domain::item::{Sku, SkuId};
use checkout_core::domain::user::UserId;
use checkout_core::errors::{ApplicationError, CouponError};

pub mod coupon;
pub mod memory;
pub mod sku;

pub use coupon::SqlCouponRepository;
pub use memory::{InMemoryCouponRepository, InMemorySkuRepository};
pub use sku::SqlSkuRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

impl From<RepositoryError> for CouponError {
    fn from(error: RepositoryError) -> Self {
        CouponError::Store(error.to_string())
    }
}

/// Coupon rows keyed by `(owner, code)`.
///
/// The state-changing methods are conditional updates: each reports whether
/// the row was in the expected state and changed, so two callers racing on
/// the same coupon cannot both win.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// The coupon if it is still valid (available or locked).
    async fn find_active(&self, code: &str, owner: &UserId)
        -> Result<Option<Coupon>, RepositoryError>;

    /// The coupon in any state, redeemed included.
    async fn find_by_code(
        &self,
        code: &str,
        owner: &UserId,
    ) -> Result<Option<Coupon>, RepositoryError>;

    /// `available -> locked`. False when missing, spent or already locked.
    async fn try_lock(&self, code: &str, owner: &UserId) -> Result<bool, RepositoryError>;

    /// `locked -> available`. False when the row was not locked.
    async fn release_lock(&self, code: &str, owner: &UserId) -> Result<bool, RepositoryError>;

    /// `locked -> redeemed`, merging `metadata` over what is stored.
    async fn mark_redeemed(
        &self,
        code: &str,
        owner: &UserId,
        metadata: &CouponMetadata,
        redeemed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Stores the coupon under its `(owner, code)` key, replacing any stored
    /// coupon that shares that key or the id.
    async fn save(&self, coupon: Coupon) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SkuRepository: Send + Sync {
    async fn find_by_id(&self, id: &SkuId) -> Result<Option<Sku>, RepositoryError>;
    async fn stock_of(&self, id: &SkuId) -> Result<u32, RepositoryError>;
    async fn save(&self, sku: Sku, stock: u32) -> Result<(), RepositoryError>;
}
