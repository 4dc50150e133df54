//! Catalog aggregation: search, landing-page composition and the car
//! mutations. Store errors are logged with the failing operation and
//! propagated untouched; the HTTP layer owns status-code translation.

use tracing::error;

use crate::cars::dto::{CarDto, SearchPage, SearchQuery, PAGE_SIZE};
use crate::cars::repo::{CarChanges, CarFilter, CatalogStore, NewCar};
use crate::error::StoreResult;
use crate::promotions::repo::{Promotion, PromotionStore};

const HOME_PAGE_MAX: i64 = 6;
const LATEST_PROMOTIONS: i64 = 5;

pub async fn car_by_id(catalog: &dyn CatalogStore, id: i32) -> StoreResult<Option<CarDto>> {
    let car = catalog
        .find_by_id(id)
        .await
        .inspect_err(|e| error!(error = %e, id, "car_by_id failed"))?;
    Ok(car.map(CarDto::from))
}

pub async fn search_cars(
    catalog: &dyn CatalogStore,
    query: &SearchQuery,
) -> StoreResult<SearchPage> {
    let filter = CarFilter::unsold()
        .price_range(query.min_price, query.max_price)
        .brands(query.brand_id_list());
    let offset = query.page.saturating_sub(1).saturating_mul(PAGE_SIZE);

    let (cars, total_items) = catalog
        .find_and_count(&filter, offset, PAGE_SIZE)
        .await
        .inspect_err(|e| error!(error = %e, "search_cars failed"))?;

    Ok(SearchPage::new(
        cars.into_iter().map(CarDto::from).collect(),
        total_items,
        query.page,
    ))
}

/// Up to six cars for the landing page, promoted inventory first. Promoted
/// cars that turn out sold or deleted are not backfilled from the promotion
/// set; the remainder comes from unsold cars outside it.
pub async fn home_page_cars(
    catalog: &dyn CatalogStore,
    promotions: &dyn PromotionStore,
) -> StoreResult<Vec<CarDto>> {
    let promos = promotions
        .find_random(HOME_PAGE_MAX)
        .await
        .inspect_err(|e| error!(error = %e, "home_page_cars failed"))?;
    let car_ids: Vec<i32> = promos.iter().map(|p| p.car_id).collect();

    let promoted = if car_ids.is_empty() {
        Vec::new()
    } else {
        catalog
            .find_all(&CarFilter::unsold().among_ids(car_ids), None)
            .await
            .inspect_err(|e| error!(error = %e, "home_page_cars failed"))?
    };

    let existing_ids: Vec<i32> = promoted.iter().map(|c| c.id).collect();
    let remaining = HOME_PAGE_MAX - existing_ids.len() as i64;
    let fill = if remaining > 0 {
        catalog
            .find_all(&CarFilter::unsold().excluding_ids(existing_ids), Some(remaining))
            .await
            .inspect_err(|e| error!(error = %e, "home_page_cars failed"))?
    } else {
        Vec::new()
    };

    Ok(promoted
        .into_iter()
        .map(|car| CarDto::from(car).promoted(true))
        .chain(fill.into_iter().map(CarDto::from))
        .collect())
}

/// The five most recent promotions resolved to their unsold cars. Sold or
/// deleted cars simply drop out of the membership fetch.
pub async fn latest_promotion_cars(
    catalog: &dyn CatalogStore,
    promotions: &dyn PromotionStore,
) -> StoreResult<Vec<CarDto>> {
    let promos = promotions
        .find_latest(LATEST_PROMOTIONS)
        .await
        .inspect_err(|e| error!(error = %e, "latest_promotion_cars failed"))?;
    let car_ids: Vec<i32> = promos.iter().map(|p| p.car_id).collect();
    if car_ids.is_empty() {
        return Ok(Vec::new());
    }

    let cars = catalog
        .find_all(&CarFilter::unsold().among_ids(car_ids), None)
        .await
        .inspect_err(|e| error!(error = %e, "latest_promotion_cars failed"))?;
    Ok(cars.into_iter().map(CarDto::from).collect())
}

/// All of a user's cars, sold or not, each tagged with whether any
/// promotion row links to it.
pub async fn user_cars(catalog: &dyn CatalogStore, user_id: i32) -> StoreResult<Vec<CarDto>> {
    let cars = catalog
        .find_by_owner(user_id)
        .await
        .inspect_err(|e| error!(error = %e, user_id, "user_cars failed"))?;
    Ok(cars.into_iter().map(CarDto::from).collect())
}

pub async fn create_car(catalog: &dyn CatalogStore, new_car: NewCar) -> StoreResult<CarDto> {
    let car = catalog
        .create(new_car)
        .await
        .inspect_err(|e| error!(error = %e, "create_car failed"))?;
    Ok(CarDto::from(car))
}

pub async fn update_car(
    catalog: &dyn CatalogStore,
    id: i32,
    changes: CarChanges,
) -> StoreResult<Option<CarDto>> {
    let car = catalog
        .update(id, changes)
        .await
        .inspect_err(|e| error!(error = %e, id, "update_car failed"))?;
    Ok(car.map(CarDto::from))
}

pub async fn delete_car(catalog: &dyn CatalogStore, id: i32) -> StoreResult<bool> {
    catalog
        .delete(id)
        .await
        .inspect_err(|e| error!(error = %e, id, "delete_car failed"))
}

/// Link a car to a promotion price. `None` when the car does not exist; a
/// bad price id surfaces as a store failure.
pub async fn promote_car(
    catalog: &dyn CatalogStore,
    promotions: &dyn PromotionStore,
    car_id: i32,
    promotion_price_id: i32,
) -> StoreResult<Option<Promotion>> {
    if catalog.find_by_id(car_id).await?.is_none() {
        return Ok(None);
    }
    let promo = promotions
        .create(car_id, promotion_price_id)
        .await
        .inspect_err(|e| error!(error = %e, car_id, "promote_car failed"))?;
    Ok(Some(promo))
}

/// Remove a car's promotion (first match; a car holds at most one active
/// promotion). False when the car or its promotion is absent.
pub async fn delete_promotion(
    catalog: &dyn CatalogStore,
    promotions: &dyn PromotionStore,
    car_id: i32,
) -> StoreResult<bool> {
    if catalog.find_by_id(car_id).await?.is_none() {
        return Ok(false);
    }
    let Some(promo) = promotions
        .find_by_car_id(car_id)
        .await
        .inspect_err(|e| error!(error = %e, car_id, "delete_promotion failed"))?
    else {
        return Ok(false);
    };
    promotions.delete(promo.id).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::cars::repo::{CarRecord, OwnedCar};
    use crate::error::StoreError;
    use crate::promotions::repo::PromotionPrice;

    fn car(id: i32, price: i64, brand_id: i32, user_id: i32, is_sold: bool) -> CarRecord {
        let now = OffsetDateTime::now_utc();
        CarRecord {
            id,
            description: format!("car {id}"),
            model: "Model".into(),
            year: 2020,
            price: Decimal::from(price),
            is_sold,
            user_id,
            brand_id,
            created_at: now,
            updated_at: now,
            brand: format!("Brand{brand_id}"),
            images: Vec::new(),
        }
    }

    struct FakeCatalog {
        cars: Mutex<Vec<CarRecord>>,
        brands: HashMap<i32, String>,
        promoted_ids: Vec<i32>,
    }

    impl FakeCatalog {
        fn new(cars: Vec<CarRecord>) -> Self {
            Self {
                cars: Mutex::new(cars),
                brands: HashMap::from([(1, "Brand1".into()), (2, "Brand2".into())]),
                promoted_ids: Vec::new(),
            }
        }

        fn with_promoted(mut self, ids: Vec<i32>) -> Self {
            self.promoted_ids = ids;
            self
        }

        fn matches(filter: &CarFilter, car: &CarRecord) -> bool {
            if filter.unsold_only && car.is_sold {
                return false;
            }
            if let Some(min) = filter.min_price {
                if car.price < min {
                    return false;
                }
            }
            if let Some(max) = filter.max_price {
                if car.price > max {
                    return false;
                }
            }
            if !filter.brand_ids.is_empty() && !filter.brand_ids.contains(&car.brand_id) {
                return false;
            }
            if let Some(ids) = &filter.include_ids {
                if !ids.contains(&car.id) {
                    return false;
                }
            }
            if filter.exclude_ids.contains(&car.id) {
                return false;
            }
            true
        }

        fn filtered(&self, filter: &CarFilter) -> Vec<CarRecord> {
            self.cars
                .lock()
                .unwrap()
                .iter()
                .filter(|c| Self::matches(filter, c))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl CatalogStore for FakeCatalog {
        async fn find_by_id(&self, id: i32) -> StoreResult<Option<CarRecord>> {
            Ok(self.cars.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }

        async fn find_and_count(
            &self,
            filter: &CarFilter,
            offset: i64,
            limit: i64,
        ) -> StoreResult<(Vec<CarRecord>, i64)> {
            let all = self.filtered(filter);
            let total = all.len() as i64;
            let page = all
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit as usize)
                .collect();
            Ok((page, total))
        }

        async fn find_all(
            &self,
            filter: &CarFilter,
            limit: Option<i64>,
        ) -> StoreResult<Vec<CarRecord>> {
            let mut all = self.filtered(filter);
            if let Some(limit) = limit {
                all.truncate(limit as usize);
            }
            Ok(all)
        }

        async fn find_by_owner(&self, user_id: i32) -> StoreResult<Vec<OwnedCar>> {
            Ok(self
                .cars
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .map(|car| {
                    let promoted = self.promoted_ids.contains(&car.id);
                    OwnedCar { car, promoted }
                })
                .collect())
        }

        async fn create(&self, new_car: NewCar) -> StoreResult<CarRecord> {
            let brand = self
                .brands
                .get(&new_car.brand_id)
                .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?
                .clone();
            let mut cars = self.cars.lock().unwrap();
            let id = cars.iter().map(|c| c.id).max().unwrap_or(0) + 1;
            let now = OffsetDateTime::now_utc();
            let car = CarRecord {
                id,
                description: new_car.description,
                model: new_car.model,
                year: new_car.year,
                price: new_car.price,
                is_sold: new_car.is_sold,
                user_id: new_car.user_id,
                brand_id: new_car.brand_id,
                created_at: now,
                updated_at: now,
                brand,
                images: new_car.image_urls,
            };
            cars.push(car.clone());
            Ok(car)
        }

        async fn update(&self, id: i32, changes: CarChanges) -> StoreResult<Option<CarRecord>> {
            let mut cars = self.cars.lock().unwrap();
            let Some(car) = cars.iter_mut().find(|c| c.id == id) else {
                return Ok(None);
            };
            if let Some(price) = changes.price {
                car.price = price;
            }
            if let Some(is_sold) = changes.is_sold {
                car.is_sold = is_sold;
            }
            car.updated_at = OffsetDateTime::now_utc();
            Ok(Some(car.clone()))
        }

        async fn delete(&self, id: i32) -> StoreResult<bool> {
            let mut cars = self.cars.lock().unwrap();
            let before = cars.len();
            cars.retain(|c| c.id != id);
            Ok(cars.len() < before)
        }

        async fn count_all(&self) -> StoreResult<i64> {
            Ok(self.cars.lock().unwrap().len() as i64)
        }

        async fn count_sold(&self) -> StoreResult<i64> {
            Ok(self.cars.lock().unwrap().iter().filter(|c| c.is_sold).count() as i64)
        }
    }

    struct FakePromotions {
        promotions: Mutex<Vec<Promotion>>,
    }

    impl FakePromotions {
        fn new(car_ids: &[i32]) -> Self {
            // Ascending created_at, so later entries are "newer".
            let base = OffsetDateTime::now_utc();
            let promotions = car_ids
                .iter()
                .enumerate()
                .map(|(i, &car_id)| Promotion {
                    id: i as i32 + 1,
                    car_id,
                    promotion_price_id: 1,
                    created_at: base + Duration::seconds(i as i64),
                })
                .collect();
            Self {
                promotions: Mutex::new(promotions),
            }
        }
    }

    #[async_trait]
    impl PromotionStore for FakePromotions {
        async fn find_random(&self, n: i64) -> StoreResult<Vec<Promotion>> {
            // Deterministic stand-in for ORDER BY RANDOM().
            Ok(self
                .promotions
                .lock()
                .unwrap()
                .iter()
                .take(n as usize)
                .cloned()
                .collect())
        }

        async fn find_latest(&self, n: i64) -> StoreResult<Vec<Promotion>> {
            let mut all = self.promotions.lock().unwrap().clone();
            all.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            all.truncate(n as usize);
            Ok(all)
        }

        async fn find_by_car_id(&self, car_id: i32) -> StoreResult<Option<Promotion>> {
            Ok(self
                .promotions
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.car_id == car_id)
                .cloned())
        }

        async fn create(&self, car_id: i32, promotion_price_id: i32) -> StoreResult<Promotion> {
            let mut promotions = self.promotions.lock().unwrap();
            let id = promotions.iter().map(|p| p.id).max().unwrap_or(0) + 1;
            let promo = Promotion {
                id,
                car_id,
                promotion_price_id,
                created_at: OffsetDateTime::now_utc(),
            };
            promotions.push(promo.clone());
            Ok(promo)
        }

        async fn delete(&self, id: i32) -> StoreResult<bool> {
            let mut promotions = self.promotions.lock().unwrap();
            let before = promotions.len();
            promotions.retain(|p| p.id != id);
            Ok(promotions.len() < before)
        }

        async fn list_prices(&self) -> StoreResult<Vec<PromotionPrice>> {
            Ok(Vec::new())
        }

        async fn create_price(&self, price: Decimal) -> StoreResult<PromotionPrice> {
            let now = OffsetDateTime::now_utc();
            Ok(PromotionPrice {
                id: 1,
                price,
                created_at: now,
                updated_at: now,
            })
        }

        async fn update_price(&self, _id: i32, _price: Decimal) -> StoreResult<Option<PromotionPrice>> {
            Ok(None)
        }

        async fn delete_price(&self, _id: i32) -> StoreResult<bool> {
            Ok(false)
        }
    }

    fn query(min: Option<i64>, max: Option<i64>, brand_ids: Option<&str>, page: i64) -> SearchQuery {
        SearchQuery {
            min_price: min.map(Decimal::from),
            max_price: max.map(Decimal::from),
            brand_ids: brand_ids.map(Into::into),
            page,
        }
    }

    #[tokio::test]
    async fn search_applies_inclusive_price_range_and_brand() {
        let catalog = FakeCatalog::new(vec![
            car(1, 5000, 1, 1, false),
            car(2, 8000, 1, 1, false),
            car(3, 12000, 1, 1, false),
            car(4, 9000, 2, 1, false),
        ]);

        let page = search_cars(&catalog, &query(Some(6000), None, Some("1"), 1))
            .await
            .unwrap();
        let prices: Vec<Decimal> = page.results.iter().map(|c| c.price).collect();
        assert_eq!(prices, vec![Decimal::from(8000), Decimal::from(12000)]);
        assert_eq!(page.total_items, 2);

        let page = search_cars(&catalog, &query(Some(8000), Some(9000), None, 1))
            .await
            .unwrap();
        let ids: Vec<i32> = page.results.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[tokio::test]
    async fn search_only_lists_unsold_cars() {
        let catalog = FakeCatalog::new(vec![car(1, 5000, 1, 1, true), car(2, 5000, 1, 1, false)]);
        let page = search_cars(&catalog, &query(None, None, None, 1)).await.unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, 2);
    }

    #[tokio::test]
    async fn search_paginates_with_fixed_page_size() {
        let cars = (1..=23).map(|i| car(i, 1000, 1, 1, false)).collect();
        let catalog = FakeCatalog::new(cars);

        let page = search_cars(&catalog, &query(None, None, None, 1)).await.unwrap();
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.total_items, 23);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page);

        let page = search_cars(&catalog, &query(None, None, None, 3)).await.unwrap();
        assert_eq!(page.results.len(), 3);
        assert_eq!(page.results[0].id, 21);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn search_with_absurd_page_number_returns_an_empty_page() {
        let catalog = FakeCatalog::new(vec![car(1, 1000, 1, 1, false)]);
        let page = search_cars(&catalog, &query(None, None, None, i64::MAX))
            .await
            .unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.total_items, 1);
        assert!(!page.has_next_page);
    }

    #[tokio::test]
    async fn home_page_tags_promoted_and_backfills_to_six() {
        let cars = (1..=10).map(|i| car(i, 1000, 1, 1, false)).collect();
        let catalog = FakeCatalog::new(cars);
        let promotions = FakePromotions::new(&[3, 7]);

        let cars = home_page_cars(&catalog, &promotions).await.unwrap();
        assert_eq!(cars.len(), 6);
        assert_eq!(cars[0].id, 3);
        assert_eq!(cars[0].promoted, Some(true));
        assert_eq!(cars[1].id, 7);
        assert_eq!(cars[1].promoted, Some(true));
        for filler in &cars[2..] {
            assert_eq!(filler.promoted, None);
            assert!(filler.id != 3 && filler.id != 7);
        }
    }

    #[tokio::test]
    async fn home_page_without_promotions_returns_untagged_cars() {
        let cars = (1..=8).map(|i| car(i, 1000, 1, 1, false)).collect();
        let catalog = FakeCatalog::new(cars);
        let promotions = FakePromotions::new(&[]);

        let cars = home_page_cars(&catalog, &promotions).await.unwrap();
        assert_eq!(cars.len(), 6);
        assert!(cars.iter().all(|c| c.promoted.is_none()));
    }

    #[tokio::test]
    async fn home_page_returns_whole_inventory_when_short() {
        let catalog = FakeCatalog::new(vec![
            car(1, 1000, 1, 1, false),
            car(2, 1000, 1, 1, false),
            car(3, 1000, 1, 1, true),
        ]);
        let promotions = FakePromotions::new(&[]);

        let cars = home_page_cars(&catalog, &promotions).await.unwrap();
        assert_eq!(cars.len(), 2);
    }

    #[tokio::test]
    async fn home_page_does_not_backfill_sold_promoted_cars_from_the_set() {
        let mut cars: Vec<CarRecord> = (1..=10).map(|i| car(i, 1000, 1, 1, false)).collect();
        cars[0].is_sold = true; // promoted car 1 is sold
        let catalog = FakeCatalog::new(cars);
        let promotions = FakePromotions::new(&[1, 2]);

        let cars = home_page_cars(&catalog, &promotions).await.unwrap();
        assert_eq!(cars.len(), 6);
        assert_eq!(cars[0].id, 2);
        assert_eq!(cars[0].promoted, Some(true));
        assert_eq!(cars.iter().filter(|c| c.promoted == Some(true)).count(), 1);
        assert!(cars.iter().all(|c| c.id != 1));
    }

    #[tokio::test]
    async fn latest_promotions_drop_sold_cars_silently() {
        let mut cars: Vec<CarRecord> = (1..=6).map(|i| car(i, 1000, 1, 1, false)).collect();
        cars[4].is_sold = true; // car 5
        let catalog = FakeCatalog::new(cars);
        let promotions = FakePromotions::new(&[1, 2, 3, 4, 5, 6]);

        let cars = latest_promotion_cars(&catalog, &promotions).await.unwrap();
        // Latest five promotions cover cars 2..=6; car 5 is sold.
        let ids: Vec<i32> = cars.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 6]);
        assert!(cars.iter().all(|c| c.promoted.is_none()));
    }

    #[tokio::test]
    async fn latest_promotions_with_none_is_empty() {
        let catalog = FakeCatalog::new(vec![car(1, 1000, 1, 1, false)]);
        let promotions = FakePromotions::new(&[]);
        let cars = latest_promotion_cars(&catalog, &promotions).await.unwrap();
        assert!(cars.is_empty());
    }

    #[tokio::test]
    async fn user_cars_tag_promotion_presence_regardless_of_sold_state() {
        let catalog = FakeCatalog::new(vec![
            car(1, 1000, 1, 5, false),
            car(2, 1000, 1, 5, true),
            car(3, 1000, 1, 9, false),
        ])
        .with_promoted(vec![2]);

        let cars = user_cars(&catalog, 5).await.unwrap();
        assert_eq!(cars.len(), 2);
        assert_eq!(cars[0].promoted, Some(false));
        assert_eq!(cars[1].promoted, Some(true));
        assert!(cars[1].is_sold);
    }

    #[tokio::test]
    async fn update_applies_only_present_fields() {
        let catalog = FakeCatalog::new(vec![car(1, 5000, 1, 1, false)]);

        let updated = update_car(
            &catalog,
            1,
            CarChanges {
                price: Some(Decimal::from(4500)),
                is_sold: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.price, Decimal::from(4500));
        assert!(!updated.is_sold);

        let missing = update_car(&catalog, 99, CarChanges::default()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_car_is_idempotent_false_on_repeat() {
        let catalog = FakeCatalog::new(vec![car(1, 5000, 1, 1, false)]);
        assert!(delete_car(&catalog, 1).await.unwrap());
        assert!(!delete_car(&catalog, 1).await.unwrap());
    }

    #[tokio::test]
    async fn create_car_with_unknown_brand_fails_and_persists_nothing() {
        let catalog = FakeCatalog::new(Vec::new());
        let new_car = NewCar {
            description: "fresh".into(),
            model: "Model".into(),
            year: 2024,
            price: Decimal::from(30000),
            is_sold: false,
            user_id: 1,
            brand_id: 42,
            image_urls: vec!["https://img/a.jpg".into()],
        };
        assert!(create_car(&catalog, new_car).await.is_err());
        assert_eq!(catalog.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_car_returns_reshaped_dto_with_images() {
        let catalog = FakeCatalog::new(Vec::new());
        let new_car = NewCar {
            description: "fresh".into(),
            model: "Model".into(),
            year: 2024,
            price: Decimal::from(30000),
            is_sold: false,
            user_id: 1,
            brand_id: 1,
            image_urls: vec!["https://img/a.jpg".into(), "https://img/b.jpg".into()],
        };
        let dto = create_car(&catalog, new_car).await.unwrap();
        assert_eq!(dto.brand, "Brand1");
        assert_eq!(dto.images.len(), 2);
    }

    #[tokio::test]
    async fn delete_promotion_reports_not_found_for_car_or_promotion() {
        let catalog = FakeCatalog::new(vec![car(1, 1000, 1, 1, false), car(2, 1000, 1, 1, false)]);
        let promotions = FakePromotions::new(&[1]);

        assert!(!delete_promotion(&catalog, &promotions, 99).await.unwrap());
        assert!(!delete_promotion(&catalog, &promotions, 2).await.unwrap());
        assert!(delete_promotion(&catalog, &promotions, 1).await.unwrap());
        assert!(!delete_promotion(&catalog, &promotions, 1).await.unwrap());
    }

    #[tokio::test]
    async fn promote_car_requires_an_existing_car() {
        let catalog = FakeCatalog::new(vec![car(1, 1000, 1, 1, false)]);
        let promotions = FakePromotions::new(&[]);

        assert!(promote_car(&catalog, &promotions, 99, 1).await.unwrap().is_none());
        let promo = promote_car(&catalog, &promotions, 1, 1).await.unwrap().unwrap();
        assert_eq!(promo.car_id, 1);
    }
}
