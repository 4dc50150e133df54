use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::promotions::repo::{Promotion, PromotionPrice};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionDto {
    pub id: i32,
    pub car_id: i32,
    pub promotion_price_id: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Promotion> for PromotionDto {
    fn from(p: Promotion) -> Self {
        Self {
            id: p.id,
            car_id: p.car_id,
            promotion_price_id: p.promotion_price_id,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPriceDto {
    pub id: i32,
    pub price: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<PromotionPrice> for PromotionPriceDto {
    fn from(p: PromotionPrice) -> Self {
        Self {
            id: p.id,
            price: p.price,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromotionPriceRequest {
    pub price: Decimal,
}
