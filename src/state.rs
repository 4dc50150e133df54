use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::brands::repo::{BrandStore, PgBrandStore};
use crate::cars::repo::{CatalogStore, PgCatalogStore};
use crate::config::AppConfig;
use crate::promotions::repo::{PgPromotionStore, PromotionStore};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub catalog: Arc<dyn CatalogStore>,
    pub promotions: Arc<dyn PromotionStore>,
    pub brands: Arc<dyn BrandStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        Ok(Self::from_parts(db, config))
    }

    /// Wire Postgres-backed stores over an existing pool.
    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> Self {
        let catalog = Arc::new(PgCatalogStore::new(db.clone())) as Arc<dyn CatalogStore>;
        let promotions = Arc::new(PgPromotionStore::new(db.clone())) as Arc<dyn PromotionStore>;
        let brands = Arc::new(PgBrandStore::new(db.clone())) as Arc<dyn BrandStore>;
        Self {
            db,
            config,
            catalog,
            promotions,
            brands,
        }
    }
}
