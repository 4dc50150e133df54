use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::cars::repo::{CarRecord, OwnedCar};

/// Fixed page size for the public search listing.
pub const PAGE_SIZE: i64 = 10;

/// Search parameters. `brandIds` arrives as a comma-separated list
/// (`brandIds=1,2`); pages are 1-based and not validated — a page below 1
/// is the caller's problem.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub brand_ids: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

impl SearchQuery {
    pub fn brand_id_list(&self) -> Vec<i32> {
        self.brand_ids
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|s| s.trim().parse::<i32>().ok())
            .collect()
    }
}

/// Flat client-facing car representation. `promoted` is omitted from the
/// JSON entirely when untagged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarDto {
    pub id: i32,
    pub description: String,
    pub model: String,
    pub year: i32,
    pub price: Decimal,
    pub is_sold: bool,
    pub user_id: i32,
    pub brand_id: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub images: Vec<String>,
    pub brand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted: Option<bool>,
}

impl From<CarRecord> for CarDto {
    fn from(car: CarRecord) -> Self {
        Self {
            id: car.id,
            description: car.description,
            model: car.model,
            year: car.year,
            price: car.price,
            is_sold: car.is_sold,
            user_id: car.user_id,
            brand_id: car.brand_id,
            created_at: car.created_at,
            updated_at: car.updated_at,
            images: car.images,
            brand: car.brand,
            promoted: None,
        }
    }
}

impl From<OwnedCar> for CarDto {
    fn from(owned: OwnedCar) -> Self {
        CarDto::from(owned.car).promoted(owned.promoted)
    }
}

impl CarDto {
    pub fn promoted(mut self, value: bool) -> Self {
        self.promoted = Some(value);
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<CarDto>,
    pub total_items: i64,
    pub has_next_page: bool,
    pub total_pages: i64,
}

impl SearchPage {
    pub fn new(results: Vec<CarDto>, total_items: i64, page: i64) -> Self {
        Self {
            results,
            total_items,
            has_next_page: PAGE_SIZE.saturating_mul(page) < total_items,
            total_pages: (total_items + PAGE_SIZE - 1) / PAGE_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCarRequest {
    pub description: String,
    pub model: String,
    pub year: i32,
    pub price: Decimal,
    pub is_sold: bool,
    pub brand_id: i32,
    #[serde(default)]
    pub images_urls: Vec<String>,
}

/// Only present fields are applied; absent ones never overwrite.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCarRequest {
    pub price: Option<Decimal>,
    pub is_sold: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteCarRequest {
    pub promotion_price_id: i32,
}
