use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::StoreResult;

#[derive(Debug, Clone, FromRow)]
pub struct Brand {
    pub id: i32,
    pub name: String,
    pub icon_url: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewBrand {
    pub name: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct BrandChanges {
    pub name: Option<String>,
    pub icon_url: Option<String>,
}

#[async_trait]
pub trait BrandStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Brand>>;
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Brand>>;
    async fn create(&self, new_brand: NewBrand) -> StoreResult<Brand>;
    async fn update(&self, id: i32, changes: BrandChanges) -> StoreResult<Option<Brand>>;
    async fn delete(&self, id: i32) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct PgBrandStore {
    pool: PgPool,
}

impl PgBrandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BrandStore for PgBrandStore {
    async fn list(&self) -> StoreResult<Vec<Brand>> {
        let brands = sqlx::query_as::<_, Brand>(
            "SELECT id, name, icon_url, created_at, updated_at FROM brands ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(brands)
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Brand>> {
        let brand = sqlx::query_as::<_, Brand>(
            "SELECT id, name, icon_url, created_at, updated_at FROM brands WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(brand)
    }

    async fn create(&self, new_brand: NewBrand) -> StoreResult<Brand> {
        let brand = sqlx::query_as::<_, Brand>(
            r#"
            INSERT INTO brands (name, icon_url)
            VALUES ($1, $2)
            RETURNING id, name, icon_url, created_at, updated_at
            "#,
        )
        .bind(&new_brand.name)
        .bind(&new_brand.icon_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(brand)
    }

    async fn update(&self, id: i32, changes: BrandChanges) -> StoreResult<Option<Brand>> {
        let brand = sqlx::query_as::<_, Brand>(
            r#"
            UPDATE brands
            SET name = COALESCE($2, name),
                icon_url = COALESCE($3, icon_url),
                updated_at = now()
            WHERE id = $1
            RETURNING id, name, icon_url, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.icon_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(brand)
    }

    async fn delete(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM brands WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
