pub mod de;
pub mod dto;
pub mod handlers;
pub mod mapper;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::NutritionService;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::lookup_routes())
        .merge(handlers::search_routes())
}
