use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry as returned by item search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    pub city: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
}
