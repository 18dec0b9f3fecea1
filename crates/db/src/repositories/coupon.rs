use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use checkout_core::domain::coupon::{Coupon, CouponMetadata};
use checkout_core::domain::user::UserId;

use super::{CouponRepository, RepositoryError};
use crate::DbPool;

const COUPON_COLUMNS: &str = "id, code, owner_id, valid, locked, discount_amount, threshold, \
                              metadata_json, redeemed_at";

pub struct SqlCouponRepository {
    pool: DbPool,
}

impl SqlCouponRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        code: &str,
        owner: &UserId,
        active_only: bool,
    ) -> Result<Option<Coupon>, RepositoryError> {
        let filter = if active_only { " AND valid = 1" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupon WHERE owner_id = ? AND code = ?{filter}"
        ))
        .bind(&owner.0)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(coupon_from_row).transpose()
    }
}

#[async_trait]
impl CouponRepository for SqlCouponRepository {
    async fn find_active(
        &self,
        code: &str,
        owner: &UserId,
    ) -> Result<Option<Coupon>, RepositoryError> {
        self.fetch(code, owner, true).await
    }

    async fn find_by_code(
        &self,
        code: &str,
        owner: &UserId,
    ) -> Result<Option<Coupon>, RepositoryError> {
        self.fetch(code, owner, false).await
    }

    async fn try_lock(&self, code: &str, owner: &UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE coupon
             SET locked = 1, updated_at = ?
             WHERE owner_id = ? AND code = ? AND valid = 1 AND locked = 0",
        )
        .bind(timestamp(Utc::now()))
        .bind(&owner.0)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lock(&self, code: &str, owner: &UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE coupon
             SET locked = 0, updated_at = ?
             WHERE owner_id = ? AND code = ? AND valid = 1 AND locked = 1",
        )
        .bind(timestamp(Utc::now()))
        .bind(&owner.0)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_redeemed(
        &self,
        code: &str,
        owner: &UserId,
        metadata: &CouponMetadata,
        redeemed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let stored: Option<String> = sqlx::query_scalar(
            "SELECT metadata_json FROM coupon
             WHERE owner_id = ? AND code = ? AND valid = 1 AND locked = 1",
        )
        .bind(&owner.0)
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(stored) = stored else {
            tx.rollback().await?;
            return Ok(false);
        };

        let mut merged = decode_metadata(&stored)?;
        merged.extend(metadata.iter().map(|(key, value)| (key.clone(), value.clone())));
        let merged = encode_metadata(&merged)?;
        let stamp = timestamp(redeemed_at);

        let result = sqlx::query(
            "UPDATE coupon
             SET valid = 0, locked = 0, metadata_json = ?, redeemed_at = ?, updated_at = ?
             WHERE owner_id = ? AND code = ? AND valid = 1 AND locked = 1",
        )
        .bind(merged)
        .bind(&stamp)
        .bind(&stamp)
        .bind(&owner.0)
        .bind(code)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn save(&self, coupon: Coupon) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM coupon WHERE id = ? AND NOT (owner_id = ? AND code = ?)")
            .bind(&coupon.id)
            .bind(&coupon.owner.0)
            .bind(&coupon.code)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO coupon
                (id, code, owner_id, valid, locked, discount_amount, threshold, metadata_json,
                 redeemed_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner_id, code) DO UPDATE SET
                id = excluded.id,
                valid = excluded.valid,
                locked = excluded.locked,
                discount_amount = excluded.discount_amount,
                threshold = excluded.threshold,
                metadata_json = excluded.metadata_json,
                redeemed_at = excluded.redeemed_at,
                updated_at = excluded.updated_at",
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(&coupon.owner.0)
        .bind(coupon.valid)
        .bind(coupon.locked)
        .bind(coupon.discount_amount.to_string())
        .bind(coupon.threshold.map(|threshold| threshold.to_string()))
        .bind(encode_metadata(&coupon.metadata)?)
        .bind(coupon.redeemed_at.map(timestamp))
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn coupon_from_row(row: &SqliteRow) -> Result<Coupon, RepositoryError> {
    let discount_amount: String = row.try_get("discount_amount")?;
    let threshold: Option<String> = row.try_get("threshold")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let redeemed_at: Option<String> = row.try_get("redeemed_at")?;

    Ok(Coupon {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        owner: UserId(row.try_get("owner_id")?),
        valid: row.try_get::<i64, _>("valid")? != 0,
        locked: row.try_get::<i64, _>("locked")? != 0,
        discount_amount: parse_decimal("discount_amount", &discount_amount)?,
        threshold: threshold.as_deref().map(|value| parse_decimal("threshold", value)).transpose()?,
        metadata: decode_metadata(&metadata_json)?,
        redeemed_at: redeemed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal value for {field}: {error}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid redeemed_at `{value}`: {error}")))
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_metadata(raw: &str) -> Result<CouponMetadata, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("failed to decode metadata_json: {error}")))
}

fn encode_metadata(metadata: &CouponMetadata) -> Result<String, RepositoryError> {
    serde_json::to_string(metadata)
        .map_err(|error| RepositoryError::Decode(format!("failed to encode metadata_json: {error}")))
}
