use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;

use crate::auth::jwt::AuthUser;
use crate::cars::dto::{
    CarDto, CreateCarRequest, PromoteCarRequest, SearchPage, SearchQuery, UpdateCarRequest,
};
use crate::cars::repo::{CarChanges, NewCar};
use crate::cars::service;
use crate::error::AppError;
use crate::promotions::dto::PromotionDto;
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/cars/search", get(search))
        .route("/cars/home", get(home_page))
        .route("/cars/latest-promotions", get(latest_promotions))
        .route("/cars/:id", get(get_car))
        .route("/me/cars", get(my_cars))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/cars", post(create_car))
        .route("/cars/:id", axum::routing::patch(update_car).delete(delete_car))
        .route(
            "/cars/:id/promotion",
            post(promote_car).delete(delete_promotion),
        )
}

#[instrument(skip(state))]
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchPage>, AppError> {
    let page = service::search_cars(state.catalog.as_ref(), &query).await?;
    Ok(Json(page))
}

#[instrument(skip(state))]
async fn home_page(State(state): State<AppState>) -> Result<Json<Vec<CarDto>>, AppError> {
    let cars =
        service::home_page_cars(state.catalog.as_ref(), state.promotions.as_ref()).await?;
    Ok(Json(cars))
}

#[instrument(skip(state))]
async fn latest_promotions(State(state): State<AppState>) -> Result<Json<Vec<CarDto>>, AppError> {
    let cars =
        service::latest_promotion_cars(state.catalog.as_ref(), state.promotions.as_ref()).await?;
    Ok(Json(cars))
}

#[instrument(skip(state))]
async fn get_car(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<CarDto>, AppError> {
    let car = service::car_by_id(state.catalog.as_ref(), id)
        .await?
        .ok_or(AppError::NotFound("Car"))?;
    Ok(Json(car))
}

#[instrument(skip(state))]
async fn my_cars(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<CarDto>>, AppError> {
    let cars = service::user_cars(state.catalog.as_ref(), user_id).await?;
    Ok(Json(cars))
}

#[instrument(skip(state, payload))]
async fn create_car(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateCarRequest>,
) -> Result<(StatusCode, Json<CarDto>), AppError> {
    let new_car = NewCar {
        description: payload.description,
        model: payload.model,
        year: payload.year,
        price: payload.price,
        is_sold: payload.is_sold,
        user_id,
        brand_id: payload.brand_id,
        image_urls: payload.images_urls,
    };
    let car = service::create_car(state.catalog.as_ref(), new_car).await?;
    Ok((StatusCode::CREATED, Json(car)))
}

#[instrument(skip(state, payload))]
async fn update_car(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCarRequest>,
) -> Result<Json<CarDto>, AppError> {
    let changes = CarChanges {
        price: payload.price,
        is_sold: payload.is_sold,
    };
    let car = service::update_car(state.catalog.as_ref(), id, changes)
        .await?
        .ok_or(AppError::NotFound("Car"))?;
    Ok(Json(car))
}

#[instrument(skip(state))]
async fn delete_car(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !service::delete_car(state.catalog.as_ref(), id).await? {
        return Err(AppError::NotFound("Car"));
    }
    Ok(Json(json!({ "message": "Car deleted successfully" })))
}

#[instrument(skip(state, payload))]
async fn promote_car(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<PromoteCarRequest>,
) -> Result<(StatusCode, Json<PromotionDto>), AppError> {
    let promotion = service::promote_car(
        state.catalog.as_ref(),
        state.promotions.as_ref(),
        id,
        payload.promotion_price_id,
    )
    .await?
    .ok_or(AppError::NotFound("Car"))?;
    Ok((StatusCode::CREATED, Json(promotion.into())))
}

#[instrument(skip(state))]
async fn delete_promotion(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !service::delete_promotion(state.catalog.as_ref(), state.promotions.as_ref(), id).await? {
        return Err(AppError::NotFound("Promotion"));
    }
    Ok(Json(json!({ "message": "Promotion deleted successfully" })))
}
