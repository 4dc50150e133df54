use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::StoreResult;

#[derive(Debug, Clone, FromRow)]
pub struct Promotion {
    pub id: i32,
    pub car_id: i32,
    pub promotion_price_id: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct PromotionPrice {
    pub id: i32,
    pub price: Decimal,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Persistence boundary for Promotion/PromotionPrice records.
#[async_trait]
pub trait PromotionStore: Send + Sync {
    /// A randomized sample of up to `n` promotions.
    async fn find_random(&self, n: i64) -> StoreResult<Vec<Promotion>>;

    /// The `n` most recently created promotions.
    async fn find_latest(&self, n: i64) -> StoreResult<Vec<Promotion>>;

    /// First promotion linked to a car, if any.
    async fn find_by_car_id(&self, car_id: i32) -> StoreResult<Option<Promotion>>;

    async fn create(&self, car_id: i32, promotion_price_id: i32) -> StoreResult<Promotion>;

    async fn delete(&self, id: i32) -> StoreResult<bool>;

    async fn list_prices(&self) -> StoreResult<Vec<PromotionPrice>>;
    async fn create_price(&self, price: Decimal) -> StoreResult<PromotionPrice>;
    async fn update_price(&self, id: i32, price: Decimal) -> StoreResult<Option<PromotionPrice>>;
    async fn delete_price(&self, id: i32) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct PgPromotionStore {
    pool: PgPool,
}

impl PgPromotionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromotionStore for PgPromotionStore {
    async fn find_random(&self, n: i64) -> StoreResult<Vec<Promotion>> {
        let promotions = sqlx::query_as::<_, Promotion>(
            r#"
            SELECT id, car_id, promotion_price_id, created_at
            FROM promotions
            ORDER BY RANDOM()
            LIMIT $1
            "#,
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(promotions)
    }

    async fn find_latest(&self, n: i64) -> StoreResult<Vec<Promotion>> {
        let promotions = sqlx::query_as::<_, Promotion>(
            r#"
            SELECT id, car_id, promotion_price_id, created_at
            FROM promotions
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(promotions)
    }

    async fn find_by_car_id(&self, car_id: i32) -> StoreResult<Option<Promotion>> {
        let promotion = sqlx::query_as::<_, Promotion>(
            r#"
            SELECT id, car_id, promotion_price_id, created_at
            FROM promotions
            WHERE car_id = $1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(car_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(promotion)
    }

    async fn create(&self, car_id: i32, promotion_price_id: i32) -> StoreResult<Promotion> {
        let promotion = sqlx::query_as::<_, Promotion>(
            r#"
            INSERT INTO promotions (car_id, promotion_price_id)
            VALUES ($1, $2)
            RETURNING id, car_id, promotion_price_id, created_at
            "#,
        )
        .bind(car_id)
        .bind(promotion_price_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(promotion)
    }

    async fn delete(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_prices(&self) -> StoreResult<Vec<PromotionPrice>> {
        let prices = sqlx::query_as::<_, PromotionPrice>(
            "SELECT id, price, created_at, updated_at FROM promotion_prices ORDER BY price",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    async fn create_price(&self, price: Decimal) -> StoreResult<PromotionPrice> {
        let created = sqlx::query_as::<_, PromotionPrice>(
            r#"
            INSERT INTO promotion_prices (price)
            VALUES ($1)
            RETURNING id, price, created_at, updated_at
            "#,
        )
        .bind(price)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_price(&self, id: i32, price: Decimal) -> StoreResult<Option<PromotionPrice>> {
        let updated = sqlx::query_as::<_, PromotionPrice>(
            r#"
            UPDATE promotion_prices
            SET price = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, price, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(price)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_price(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM promotion_prices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
