use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{LookupQuery, NutritionRecord, ProductSummary};
use crate::{error::NutritionError, state::AppState};

pub fn lookup_routes() -> Router<AppState> {
    Router::new()
        .route("/nutrition", get(get_nutrition))
        .route("/nutrition/products/:id", get(get_product_nutrition))
}

pub fn search_routes() -> Router<AppState> {
    Router::new().route("/nutrition/search", get(search_products))
}

/// GET /nutrition?query=banana (also accepts `food=`)
#[instrument(skip(state))]
pub async fn get_nutrition(
    State(state): State<AppState>,
    Query(q): Query<LookupQuery>,
) -> Result<Json<NutritionRecord>, NutritionError> {
    let query = required(q)?;
    let record = state.nutrition.resolve(&query).await?;
    Ok(Json(record))
}

/// GET /nutrition/products/:id
#[instrument(skip(state))]
pub async fn get_product_nutrition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NutritionRecord>, NutritionError> {
    let record = state.nutrition.resolve_product(&id).await?;
    Ok(Json(record))
}

/// GET /nutrition/search?query=yogurt
#[instrument(skip(state))]
pub async fn search_products(
    State(state): State<AppState>,
    Query(q): Query<LookupQuery>,
) -> Result<Json<Vec<ProductSummary>>, NutritionError> {
    let query = required(q)?;
    let results = state.nutrition.search(&query).await?;
    Ok(Json(results))
}

fn required(q: LookupQuery) -> Result<String, NutritionError> {
    q.query
        .filter(|s| !s.trim().is_empty())
        .ok_or(NutritionError::Validation("Query parameter is required"))
}
