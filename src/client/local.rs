use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::client::gateway::{FetchError, ItemSearch, TrackingSource};
use crate::engine::{catalog, locations, orders};
use crate::error::AppError;
use crate::models::courier::CourierLocationSample;
use crate::models::item::Item;
use crate::models::order::Order;
use crate::state::AppState;

/// Reads straight from an [`AppState`] in the same process.
#[derive(Clone)]
pub struct InProcessGateway {
    state: Arc<AppState>,
    customer_id: Option<Uuid>,
}

impl InProcessGateway {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            customer_id: None,
        }
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }
}

impl From<AppError> for FetchError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => FetchError::NotFound(msg),
            AppError::Unauthorized(msg) => FetchError::Unauthorized(msg),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl TrackingSource for InProcessGateway {
    async fn get_order(&self, order_id: Uuid) -> Result<Order, FetchError> {
        Ok(orders::get_order(&self.state, order_id, self.customer_id)?)
    }

    async fn get_courier_location(
        &self,
        order_id: Uuid,
        shop_order_id: Uuid,
    ) -> Result<Option<CourierLocationSample>, FetchError> {
        let view =
            locations::courier_location(&self.state, order_id, shop_order_id, self.customer_id)?;
        Ok(view.location)
    }
}

#[async_trait]
impl ItemSearch for InProcessGateway {
    async fn search_items(&self, city: &str, query: &str) -> Result<Vec<Item>, FetchError> {
        Ok(catalog::search_items(&self.state, city, query))
    }
}
