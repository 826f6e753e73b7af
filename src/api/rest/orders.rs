use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::{uuid_header, COURIER_HEADER, CUSTOMER_HEADER};
use crate::engine::locations::{self, CourierLocationView};
use crate::engine::orders::{self as store, ShopOrderEntry};
use crate::error::AppError;
use crate::models::order::{Address, Order, PlaceOrderRequest, ShopOrder, ShopOrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders/:order_id", get(get_order))
        .route(
            "/orders/:order_id/shop-orders/:shop_order_id/courier-location",
            get(get_courier_location),
        )
        .route("/shop-orders/:shop_order_id/assign", post(assign_courier))
        .route("/shop-orders/:shop_order_id/status", patch(set_status))
        .route("/shops/:shop_id/shop-orders", get(list_shop_orders))
        .route("/customers/:customer_id/orders", get(list_customer_orders))
}

/// Shop order as served over HTTP, with its derived subtotal.
#[derive(Serialize)]
pub struct ShopOrderView<'a> {
    #[serde(flatten)]
    shop_order: &'a ShopOrder,
    subtotal: Decimal,
}

impl<'a> From<&'a ShopOrder> for ShopOrderView<'a> {
    fn from(shop_order: &'a ShopOrder) -> Self {
        Self {
            shop_order,
            subtotal: shop_order.subtotal(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderView<'a> {
    id: Uuid,
    customer_id: Uuid,
    address: &'a Address,
    shop_orders: Vec<ShopOrderView<'a>>,
    total: Decimal,
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a Order> for OrderView<'a> {
    fn from(order: &'a Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            address: &order.address,
            shop_orders: order.shop_orders.iter().map(ShopOrderView::from).collect(),
            total: order.total(),
            created_at: order.created_at,
        }
    }
}

#[derive(Serialize)]
struct ShopOrderEntryView<'a> {
    order_id: Uuid,
    customer_id: Uuid,
    shop_order: ShopOrderView<'a>,
}

#[derive(Deserialize)]
pub struct AssignCourierRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: ShopOrderStatus,
}

#[derive(Deserialize)]
pub struct ShopOrdersQuery {
    pub status: Option<ShopOrderStatus>,
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let order = store::place_order(&state, payload)?;
    render(&OrderView::from(&order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let caller = uuid_header(&headers, CUSTOMER_HEADER)?;
    let order = store::get_order(&state, order_id, caller)?;
    render(&OrderView::from(&order))
}

async fn get_courier_location(
    State(state): State<Arc<AppState>>,
    Path((order_id, shop_order_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<CourierLocationView>, AppError> {
    let caller = uuid_header(&headers, CUSTOMER_HEADER)?;
    let view = locations::courier_location(&state, order_id, shop_order_id, caller)?;
    Ok(Json(view))
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    Path(shop_order_id): Path<Uuid>,
    Json(payload): Json<AssignCourierRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let shop_order = store::assign_courier(&state, shop_order_id, payload.courier_id)?;
    render(&ShopOrderView::from(&shop_order))
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(shop_order_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = uuid_header(&headers, COURIER_HEADER)?;
    let shop_order = store::set_shop_order_status(&state, shop_order_id, payload.status, actor)?;
    render(&ShopOrderView::from(&shop_order))
}

async fn list_shop_orders(
    State(state): State<Arc<AppState>>,
    Path(shop_id): Path<Uuid>,
    Query(query): Query<ShopOrdersQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entries: Vec<ShopOrderEntry> = store::list_shop_orders_for_shop(&state, shop_id, query.status);
    let views: Vec<ShopOrderEntryView<'_>> = entries
        .iter()
        .map(|entry| ShopOrderEntryView {
            order_id: entry.order_id,
            customer_id: entry.customer_id,
            shop_order: ShopOrderView::from(&entry.shop_order),
        })
        .collect();
    render(&views)
}

async fn list_customer_orders(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(caller) = uuid_header(&headers, CUSTOMER_HEADER)? {
        if caller != customer_id {
            return Err(AppError::Unauthorized(format!(
                "customer {caller} cannot list orders of {customer_id}"
            )));
        }
    }

    let orders = store::list_orders_for_customer(&state, customer_id);
    let views: Vec<OrderView<'_>> = orders.iter().map(OrderView::from).collect();
    render(&views)
}

fn render<T: Serialize>(view: &T) -> Result<Json<serde_json::Value>, AppError> {
    serde_json::to_value(view)
        .map(Json)
        .map_err(|err| AppError::Internal(format!("failed to serialize response: {err}")))
}
