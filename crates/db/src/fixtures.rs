use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

const SEED_SKU_IDS: &[&str] = &["sku-tea-oolong", "sku-mug-stone", "sku-kettle", "sku-gift-card"];

/// `(id, owner, code, valid)` for every seeded coupon.
const SEED_COUPONS: &[(&str, &str, &str, bool)] = &[
    ("cpn-demo-001", "user-demo", "SAVE10", true),
    ("cpn-demo-002", "user-demo", "SPEND100", true),
    ("cpn-demo-003", "user-guest", "SAVE10", true),
    ("cpn-demo-004", "user-demo", "USED5", false),
];

/// Demo catalog and coupons for trying the checkout pipeline locally.
///
/// Loading is idempotent and resets seeded rows, so a coupon locked or
/// redeemed during a demo run becomes available again after a reseed.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult { skus_seeded: SEED_SKU_IDS.len(), coupons_seeded: SEED_COUPONS.len() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for sku_id in SEED_SKU_IDS {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sku WHERE id = ?1)")
                .bind(*sku_id)
                .fetch_one(pool)
                .await?;
            checks.push((*sku_id, exists == 1));
        }

        for (id, owner, code, valid) in SEED_COUPONS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM coupon
                    WHERE id = ?1 AND owner_id = ?2 AND code = ?3 AND valid = ?4 AND locked = 0
                )",
            )
            .bind(*id)
            .bind(*owner)
            .bind(*code)
            .bind(*valid)
            .fetch_one(pool)
            .await?;
            checks.push((*id, exists == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let coupon_ids = SEED_COUPONS.iter().map(|(id, ..)| *id).collect::<Vec<_>>();
        sqlx::query(&format!("DELETE FROM coupon WHERE id IN {}", sql_array_from_ids(&coupon_ids)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM sku WHERE id IN {}", sql_array_from_ids(SEED_SKU_IDS)))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub skus_seeded: usize,
    pub coupons_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
