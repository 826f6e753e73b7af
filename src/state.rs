use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::courier::CourierLocationSample;
use crate::models::event::ShopOrderEvent;
use crate::models::item::Item;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

/// Server-side stores, injected into handlers and collaborators.
pub struct AppState {
    pub orders: DashMap<Uuid, Order>,
    /// shop order id -> owning order id
    pub shop_order_index: DashMap<Uuid, Uuid>,
    /// Latest known sample per courier.
    pub courier_locations: DashMap<Uuid, CourierLocationSample>,
    pub items: DashMap<Uuid, Item>,
    pub events_tx: broadcast::Sender<ShopOrderEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            orders: DashMap::new(),
            shop_order_index: DashMap::new(),
            courier_locations: DashMap::new(),
            items: DashMap::new(),
            events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Seeds the searchable catalog. Catalog management itself lives elsewhere.
    pub fn insert_item(&self, item: Item) {
        self.items.insert(item.id, item);
    }
}
