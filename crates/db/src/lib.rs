pub mod connection;
pub mod fixtures;
pub mod local_coupon;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, SeedResult, VerificationResult};
pub use local_coupon::LocalCouponProvider;
pub use repositories::{
    CouponRepository, InMemoryCouponRepository, InMemorySkuRepository, RepositoryError,
    SkuRepository, SqlCouponRepository, SqlSkuRepository,
};
