pub mod couriers;
pub mod items;
pub mod orders;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const COURIER_HEADER: &str = "x-courier-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(couriers::router())
        .merge(items::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Reads an optional uuid header. A malformed value is a bad request.
pub(crate) fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(raw) = headers.get(name) else {
        return Ok(None);
    };

    raw.to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("{name} must be a uuid")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    shop_orders: usize,
    tracked_couriers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        shop_orders: state.shop_order_index.len(),
        tracked_couriers: state.courier_locations.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
