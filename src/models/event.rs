use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::ShopOrderStatus;

/// Broadcast for every accepted shop order transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopOrderEvent {
    pub order_id: Uuid,
    pub shop_order_id: Uuid,
    pub shop_id: Uuid,
    pub status: ShopOrderStatus,
    pub courier_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}
