use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::catalog;
use crate::models::item::Item;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/items/search", get(search_items))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub query: String,
}

async fn search_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Json<Vec<Item>> {
    Json(catalog::search_items(&state, &params.city, &params.query))
}
