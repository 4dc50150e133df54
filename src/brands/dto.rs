use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::brands::repo::Brand;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandDto {
    pub id: i32,
    pub name: String,
    pub icon_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Brand> for BrandDto {
    fn from(b: Brand) -> Self {
        Self {
            id: b.id,
            name: b.name,
            icon_url: b.icon_url,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrandRequest {
    pub name: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBrandRequest {
    pub name: Option<String>,
    pub icon_url: Option<String>,
}
