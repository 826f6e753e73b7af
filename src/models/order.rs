use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::cart::CartLine;
use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShopOrderStatus {
    Pending,
    Assigned,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl ShopOrderStatus {
    pub const ALL: [ShopOrderStatus; 5] = [
        ShopOrderStatus::Pending,
        ShopOrderStatus::Assigned,
        ShopOrderStatus::OutForDelivery,
        ShopOrderStatus::Delivered,
        ShopOrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, ShopOrderStatus::Delivered | ShopOrderStatus::Cancelled)
    }

    /// Statuses in which a courier is attached to the shop order.
    pub fn has_courier(self) -> bool {
        matches!(
            self,
            ShopOrderStatus::Assigned | ShopOrderStatus::OutForDelivery | ShopOrderStatus::Delivered
        )
    }

    /// Statuses in which the courier's position is worth polling for.
    pub fn is_trackable(self) -> bool {
        matches!(self, ShopOrderStatus::Assigned | ShopOrderStatus::OutForDelivery)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShopOrderStatus::Pending => "pending",
            ShopOrderStatus::Assigned => "assigned",
            ShopOrderStatus::OutForDelivery => "out_for_delivery",
            ShopOrderStatus::Delivered => "delivered",
            ShopOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ShopOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub text: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Address {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }
}

/// Item snapshot taken at checkout. Later catalog edits never reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub item_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// `None` when the product does not fit in a `Decimal`.
    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: line.item_id,
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

/// The part of an [`Order`] that belongs to one shop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopOrder {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub status: ShopOrderStatus,
    pub assigned_courier_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl ShopOrder {
    pub fn new(shop_id: Uuid, lines: Vec<OrderLine>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id,
            lines,
            status: ShopOrderStatus::Pending,
            assigned_courier_id: None,
            updated_at: now,
        }
    }

    /// Always recomputed from the line snapshot.
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(OrderLine::line_total).sum()
    }

    pub fn checked_subtotal(&self) -> Option<Decimal> {
        self.lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, line| acc.checked_add(line.checked_line_total()?))
    }

    /// Checks the courier/status invariant on data received from elsewhere.
    pub fn validate(&self) -> Result<(), String> {
        match (self.status.has_courier(), self.assigned_courier_id) {
            (true, None) => Err(format!(
                "shop order {} is {} but has no assigned courier",
                self.id, self.status
            )),
            (false, Some(courier_id)) => Err(format!(
                "shop order {} is {} but carries courier {}",
                self.id, self.status, courier_id
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub address: Address,
    pub shop_orders: Vec<ShopOrder>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn shop_order(&self, shop_order_id: Uuid) -> Option<&ShopOrder> {
        self.shop_orders.iter().find(|so| so.id == shop_order_id)
    }

    pub fn shop_order_mut(&mut self, shop_order_id: Uuid) -> Option<&mut ShopOrder> {
        self.shop_orders.iter_mut().find(|so| so.id == shop_order_id)
    }

    pub fn total(&self) -> Decimal {
        self.shop_orders.iter().map(ShopOrder::subtotal).sum()
    }

    /// Total that is `None` instead of panicking when amounts overflow.
    /// Stored orders always have one, so `total` and `subtotal` are safe on them.
    pub fn checked_total(&self) -> Option<Decimal> {
        self.shop_orders
            .iter()
            .try_fold(Decimal::ZERO, |acc, so| acc.checked_add(so.checked_subtotal()?))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.shop_orders.is_empty() {
            return Err(format!("order {} has no shop orders", self.id));
        }
        if self.checked_total().is_none() {
            return Err(format!("order {} amounts overflow", self.id));
        }
        self.shop_orders.iter().try_for_each(ShopOrder::validate)
    }
}

/// Checkout payload: the cart lines as they stood when the customer paid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceOrderRequest {
    pub customer_id: Uuid,
    pub address: Address,
    pub lines: Vec<CartLine>,
}
