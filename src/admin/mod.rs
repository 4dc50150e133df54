pub mod handlers;

use axum::{
    routing::{get, patch},
    Router,
};

use crate::state::AppState;

/// Superadmin-only surface: brand CRUD, promotion price CRUD, dashboard.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/brands",
            get(handlers::list_brands).post(handlers::create_brand),
        )
        .route(
            "/brands/:id",
            get(handlers::get_brand)
                .patch(handlers::update_brand)
                .delete(handlers::delete_brand),
        )
        .route(
            "/promotion-prices",
            get(handlers::list_promotion_prices).post(handlers::create_promotion_price),
        )
        .route(
            "/promotion-prices/:id",
            patch(handlers::update_promotion_price).delete(handlers::delete_promotion_price),
        )
        .route("/dashboard", get(handlers::dashboard))
}
