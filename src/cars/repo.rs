use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::error::StoreResult;

/// A car row joined with its brand name. `brand` and `images` default to
/// empty when the query does not produce them; callers of the insert path
/// fill them in before the record leaves the store.
#[derive(Debug, Clone, FromRow)]
pub struct CarRecord {
    pub id: i32,
    pub description: String,
    pub model: String,
    pub year: i32,
    pub price: Decimal,
    pub is_sold: bool,
    pub user_id: i32,
    pub brand_id: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sqlx(default)]
    pub brand: String,
    #[sqlx(default)]
    pub images: Vec<String>,
}

/// Owner-listing row: the car plus whether any promotion row links to it.
#[derive(Debug, Clone)]
pub struct OwnedCar {
    pub car: CarRecord,
    pub promoted: bool,
}

#[derive(Debug, Clone)]
pub struct NewCar {
    pub description: String,
    pub model: String,
    pub year: i32,
    pub price: Decimal,
    pub is_sold: bool,
    pub user_id: i32,
    pub brand_id: i32,
    pub image_urls: Vec<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarChanges {
    pub price: Option<Decimal>,
    pub is_sold: Option<bool>,
}

/// Filter conditions applied to catalog queries. Price bounds are
/// inclusive; an empty `brand_ids` means no brand constraint.
#[derive(Debug, Clone, Default)]
pub struct CarFilter {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub brand_ids: Vec<i32>,
    pub unsold_only: bool,
    pub include_ids: Option<Vec<i32>>,
    pub exclude_ids: Vec<i32>,
}

impl CarFilter {
    /// Available inventory only.
    pub fn unsold() -> Self {
        Self {
            unsold_only: true,
            ..Default::default()
        }
    }

    pub fn price_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn brands(mut self, brand_ids: Vec<i32>) -> Self {
        self.brand_ids = brand_ids;
        self
    }

    /// Restrict to membership in the given id set.
    pub fn among_ids(mut self, ids: Vec<i32>) -> Self {
        self.include_ids = Some(ids);
        self
    }

    pub fn excluding_ids(mut self, ids: Vec<i32>) -> Self {
        self.exclude_ids = ids;
        self
    }
}

/// Persistence boundary for Car/Brand/CarImage records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<CarRecord>>;

    /// Paginated query returning the matching page plus the total match count.
    async fn find_and_count(
        &self,
        filter: &CarFilter,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<CarRecord>, i64)>;

    async fn find_all(&self, filter: &CarFilter, limit: Option<i64>)
        -> StoreResult<Vec<CarRecord>>;

    /// All cars owned by a user, sold or not, with the promotion-link flag.
    async fn find_by_owner(&self, user_id: i32) -> StoreResult<Vec<OwnedCar>>;

    /// Insert a car together with its images in one transaction. A brand_id
    /// that references no brand surfaces as a store failure.
    async fn create(&self, new_car: NewCar) -> StoreResult<CarRecord>;

    /// Apply the supplied fields and refresh `updated_at`. `None` when the
    /// id does not exist.
    async fn update(&self, id: i32, changes: CarChanges) -> StoreResult<Option<CarRecord>>;

    /// Returns whether a row was actually removed.
    async fn delete(&self, id: i32) -> StoreResult<bool>;

    async fn count_all(&self) -> StoreResult<i64>;
    async fn count_sold(&self) -> StoreResult<i64>;
}

const SELECT_CARS: &str = "SELECT c.id, c.description, c.model, c.year, c.price, c.is_sold, \
     c.user_id, c.brand_id, c.created_at, c.updated_at, b.name AS brand \
     FROM cars c JOIN brands b ON b.id = c.brand_id";

fn push_filter(qb: &mut QueryBuilder<Postgres>, filter: &CarFilter) {
    qb.push(" WHERE true");
    if filter.unsold_only {
        qb.push(" AND c.is_sold = false");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND c.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND c.price <= ").push_bind(max);
    }
    if !filter.brand_ids.is_empty() {
        qb.push(" AND c.brand_id = ANY(")
            .push_bind(filter.brand_ids.clone())
            .push(")");
    }
    if let Some(ids) = &filter.include_ids {
        qb.push(" AND c.id = ANY(").push_bind(ids.clone()).push(")");
    }
    if !filter.exclude_ids.is_empty() {
        qb.push(" AND c.id <> ALL(")
            .push_bind(filter.exclude_ids.clone())
            .push(")");
    }
}

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch image urls for the given cars in one grouped query and attach
    /// them in insertion order.
    async fn attach_images(&self, mut cars: Vec<CarRecord>) -> StoreResult<Vec<CarRecord>> {
        if cars.is_empty() {
            return Ok(cars);
        }
        let ids: Vec<i32> = cars.iter().map(|c| c.id).collect();
        let rows: Vec<(i32, String)> = sqlx::query_as(
            "SELECT car_id, url FROM car_images WHERE car_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_car: HashMap<i32, Vec<String>> = HashMap::new();
        for (car_id, url) in rows {
            by_car.entry(car_id).or_default().push(url);
        }
        for car in &mut cars {
            car.images = by_car.remove(&car.id).unwrap_or_default();
        }
        Ok(cars)
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_by_id(&self, id: i32) -> StoreResult<Option<CarRecord>> {
        let mut qb = QueryBuilder::new(SELECT_CARS);
        qb.push(" WHERE c.id = ").push_bind(id);
        let car: Option<CarRecord> = qb.build_query_as().fetch_optional(&self.pool).await?;

        match car {
            Some(car) => {
                let mut cars = self.attach_images(vec![car]).await?;
                Ok(cars.pop())
            }
            None => Ok(None),
        }
    }

    async fn find_and_count(
        &self,
        filter: &CarFilter,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<CarRecord>, i64)> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM cars c");
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::new(SELECT_CARS);
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY c.id OFFSET ")
            .push_bind(offset)
            .push(" LIMIT ")
            .push_bind(limit);
        let cars: Vec<CarRecord> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok((self.attach_images(cars).await?, total))
    }

    async fn find_all(
        &self,
        filter: &CarFilter,
        limit: Option<i64>,
    ) -> StoreResult<Vec<CarRecord>> {
        let mut qb = QueryBuilder::new(SELECT_CARS);
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY c.id");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        let cars: Vec<CarRecord> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.attach_images(cars).await
    }

    async fn find_by_owner(&self, user_id: i32) -> StoreResult<Vec<OwnedCar>> {
        let mut qb = QueryBuilder::new(SELECT_CARS);
        qb.push(" WHERE c.user_id = ")
            .push_bind(user_id)
            .push(" ORDER BY c.id");
        let cars: Vec<CarRecord> = qb.build_query_as().fetch_all(&self.pool).await?;
        let cars = self.attach_images(cars).await?;

        if cars.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = cars.iter().map(|c| c.id).collect();
        let promoted_ids: Vec<i32> = sqlx::query_scalar(
            "SELECT DISTINCT car_id FROM promotions WHERE car_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(cars
            .into_iter()
            .map(|car| {
                let promoted = promoted_ids.contains(&car.id);
                OwnedCar { car, promoted }
            })
            .collect())
    }

    async fn create(&self, new_car: NewCar) -> StoreResult<CarRecord> {
        let mut tx = self.pool.begin().await?;

        let mut car: CarRecord = sqlx::query_as(
            r#"
            INSERT INTO cars (description, model, year, price, is_sold, user_id, brand_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, description, model, year, price, is_sold, user_id, brand_id,
                      created_at, updated_at
            "#,
        )
        .bind(&new_car.description)
        .bind(&new_car.model)
        .bind(new_car.year)
        .bind(new_car.price)
        .bind(new_car.is_sold)
        .bind(new_car.user_id)
        .bind(new_car.brand_id)
        .fetch_one(&mut *tx)
        .await?;

        let brand: String = sqlx::query_scalar("SELECT name FROM brands WHERE id = $1")
            .bind(new_car.brand_id)
            .fetch_one(&mut *tx)
            .await?;

        if !new_car.image_urls.is_empty() {
            let mut qb = QueryBuilder::new("INSERT INTO car_images (car_id, url) ");
            qb.push_values(new_car.image_urls.iter(), |mut b, url| {
                b.push_bind(car.id).push_bind(url);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        car.brand = brand;
        car.images = new_car.image_urls;
        Ok(car)
    }

    async fn update(&self, id: i32, changes: CarChanges) -> StoreResult<Option<CarRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE cars
            SET price = COALESCE($2, price),
                is_sold = COALESCE($3, is_sold),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.price)
        .bind(changes.is_sold)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn delete(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cars WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_all(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cars")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_sold(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cars WHERE is_sold = true")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
