pub mod dto;
pub mod handlers;
pub mod repo;
pub mod service;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    handlers::read_routes().merge(handlers::write_routes())
}
