use async_trait::async_trait;
use sqlx::Row;

use checkout_core::checkout::{SkuCatalog, StockService};
use checkout_core::domain::item::{Sku, SkuId};
use checkout_core::errors::ApplicationError;

use super::coupon::parse_decimal;
use super::{RepositoryError, SkuRepository};
use crate::DbPool;

pub struct SqlSkuRepository {
    pool: DbPool,
}

impl SqlSkuRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SkuRepository for SqlSkuRepository {
    async fn find_by_id(&self, id: &SkuId) -> Result<Option<Sku>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, unit_price FROM sku WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let unit_price: Option<String> = row.try_get("unit_price")?;
        Ok(Some(Sku {
            id: SkuId(row.try_get("id")?),
            name: row.try_get("name")?,
            unit_price: unit_price.as_deref().map(|value| parse_decimal("unit_price", value)).transpose()?,
        }))
    }

    async fn stock_of(&self, id: &SkuId) -> Result<u32, RepositoryError> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM sku WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let stock = stock.unwrap_or_default();
        u32::try_from(stock)
            .map_err(|_| RepositoryError::Decode(format!("stock `{stock}` for sku `{}` is out of range", id.0)))
    }

    async fn save(&self, sku: Sku, stock: u32) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sku (id, name, unit_price, stock, updated_at)
             VALUES (?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                unit_price = excluded.unit_price,
                stock = excluded.stock,
                updated_at = excluded.updated_at",
        )
        .bind(&sku.id.0)
        .bind(&sku.name)
        .bind(sku.unit_price.map(|price| price.to_string()))
        .bind(i64::from(stock))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SkuCatalog for SqlSkuRepository {
    async fn find_sku(&self, sku_id: &SkuId) -> Result<Option<Sku>, ApplicationError> {
        Ok(self.find_by_id(sku_id).await?)
    }
}

#[async_trait]
impl StockService for SqlSkuRepository {
    async fn available_stock(&self, sku_id: &SkuId) -> Result<u32, ApplicationError> {
        Ok(self.stock_of(sku_id).await?)
    }
}
