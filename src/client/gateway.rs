use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::courier::CourierLocationSample;
use crate::models::item::Item;
use crate::models::order::Order;

/// Failure at the collaborator boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Read side of the order store, as seen by a tracking client.
#[async_trait]
pub trait TrackingSource: Send + Sync {
    async fn get_order(&self, order_id: Uuid) -> Result<Order, FetchError>;

    /// `Ok(None)` means no courier is assigned yet or none has reported.
    async fn get_courier_location(
        &self,
        order_id: Uuid,
        shop_order_id: Uuid,
    ) -> Result<Option<CourierLocationSample>, FetchError>;
}

/// Item lookup. Callers may drop the returned future at any point.
#[async_trait]
pub trait ItemSearch: Send + Sync {
    async fn search_items(&self, city: &str, query: &str) -> Result<Vec<Item>, FetchError>;
}
