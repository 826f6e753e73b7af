use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::checkout::build_order;
use crate::engine::lifecycle::{apply_transition, Transition, TransitionError};
use crate::error::AppError;
use crate::models::event::ShopOrderEvent;
use crate::models::order::{Order, PlaceOrderRequest, ShopOrder, ShopOrderStatus};
use crate::state::AppState;

/// A shop order together with the order that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopOrderEntry {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub shop_order: ShopOrder,
}

pub fn place_order(state: &AppState, request: PlaceOrderRequest) -> Result<Order, AppError> {
    let start = Instant::now();
    let order = build_order(request, Utc::now())?;

    // Index entries only ever point at an order that is already stored.
    state.orders.insert(order.id, order.clone());
    for shop_order in &order.shop_orders {
        state.shop_order_index.insert(shop_order.id, order.id);
    }

    state.metrics.orders_placed_total.inc();
    state
        .metrics
        .shop_orders_active
        .add(order.shop_orders.len() as i64);
    state
        .metrics
        .checkout_latency_seconds
        .observe(start.elapsed().as_secs_f64());

    info!(
        order_id = %order.id,
        customer_id = %order.customer_id,
        shop_orders = order.shop_orders.len(),
        "order placed"
    );

    Ok(order)
}

/// Fetches an order. When `caller` is given it must be the order's customer.
pub fn get_order(state: &AppState, order_id: Uuid, caller: Option<Uuid>) -> Result<Order, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    authorize_customer(&order, caller)?;
    Ok(order.value().clone())
}

pub fn authorize_customer(order: &Order, caller: Option<Uuid>) -> Result<(), AppError> {
    match caller {
        Some(customer_id) if customer_id != order.customer_id => Err(AppError::Unauthorized(
            format!("order {} does not belong to customer {customer_id}", order.id),
        )),
        _ => Ok(()),
    }
}

pub fn assign_courier(
    state: &AppState,
    shop_order_id: Uuid,
    courier_id: Uuid,
) -> Result<ShopOrder, AppError> {
    transition_shop_order(state, shop_order_id, Transition::Assign(courier_id), None)
}

/// Moves a shop order towards `status`. `actor` is the courier making the
/// change; when given it must match the assigned courier.
pub fn set_shop_order_status(
    state: &AppState,
    shop_order_id: Uuid,
    status: ShopOrderStatus,
    actor: Option<Uuid>,
) -> Result<ShopOrder, AppError> {
    let transition = match Transition::towards(status) {
        Some(transition) => transition,
        None if status == ShopOrderStatus::Assigned => {
            return Err(AppError::BadRequest(
                "use the assign endpoint to attach a courier".to_string(),
            ));
        }
        None => {
            // Nothing leads back to pending, whatever the current status.
            let from = current_status(state, shop_order_id)?;
            return Err(TransitionError::InvalidTransition {
                from,
                action: "reopen",
            }
            .into());
        }
    };

    transition_shop_order(state, shop_order_id, transition, actor)
}

fn current_status(state: &AppState, shop_order_id: Uuid) -> Result<ShopOrderStatus, AppError> {
    let not_found = || AppError::NotFound(format!("shop order {shop_order_id} not found"));
    let order_id = *state.shop_order_index.get(&shop_order_id).ok_or_else(not_found)?;
    let order = state.orders.get(&order_id).ok_or_else(not_found)?;
    order
        .shop_order(shop_order_id)
        .map(|shop_order| shop_order.status)
        .ok_or_else(not_found)
}

fn transition_shop_order(
    state: &AppState,
    shop_order_id: Uuid,
    transition: Transition,
    actor: Option<Uuid>,
) -> Result<ShopOrder, AppError> {
    let order_id = state
        .shop_order_index
        .get(&shop_order_id)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("shop order {shop_order_id} not found")))?;

    // The entry guard serializes every transition on this order.
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
    let shop_order = order
        .shop_order_mut(shop_order_id)
        .ok_or_else(|| AppError::NotFound(format!("shop order {shop_order_id} not found")))?;

    if let (Some(actor), Some(assigned)) = (actor, shop_order.assigned_courier_id) {
        if actor != assigned {
            return Err(AppError::Unauthorized(format!(
                "courier {actor} is not assigned to shop order {shop_order_id}"
            )));
        }
    }

    let outcome = apply_transition(shop_order, transition, Utc::now());
    let label = if outcome.is_ok() { "accepted" } else { "rejected" };
    state
        .metrics
        .shop_order_transitions_total
        .with_label_values(&[transition.name(), label])
        .inc();

    let from = match outcome {
        Ok(from) => from,
        Err(err) => {
            warn!(
                order_id = %order_id,
                shop_order_id = %shop_order_id,
                transition = transition.name(),
                error = %err,
                "shop order transition rejected"
            );
            return Err(err.into());
        }
    };

    let updated = shop_order.clone();
    drop(order);

    if updated.status.is_terminal() {
        state.metrics.shop_orders_active.dec();
    }

    let event = ShopOrderEvent {
        order_id,
        shop_order_id,
        shop_id: updated.shop_id,
        status: updated.status,
        courier_id: updated.assigned_courier_id,
        at: updated.updated_at,
    };
    let _ = state.events_tx.send(event);

    info!(
        order_id = %order_id,
        shop_order_id = %shop_order_id,
        from = %from,
        to = %updated.status,
        "shop order transitioned"
    );

    Ok(updated)
}

pub fn list_orders_for_customer(state: &AppState, customer_id: Uuid) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| entry.customer_id == customer_id)
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

/// Shop orders of one shop, oldest first, optionally narrowed to one status.
pub fn list_shop_orders_for_shop(
    state: &AppState,
    shop_id: Uuid,
    status: Option<ShopOrderStatus>,
) -> Vec<ShopOrderEntry> {
    let mut entries: Vec<(chrono::DateTime<Utc>, ShopOrderEntry)> = state
        .orders
        .iter()
        .flat_map(|entry| {
            let order = entry.value();
            order
                .shop_orders
                .iter()
                .filter(|so| so.shop_id == shop_id)
                .filter(|so| status.is_none_or(|wanted| so.status == wanted))
                .map(|so| {
                    (
                        order.created_at,
                        ShopOrderEntry {
                            order_id: order.id,
                            customer_id: order.customer_id,
                            shop_order: so.clone(),
                        },
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, entry)| entry).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{
        assign_courier, get_order, list_shop_orders_for_shop, place_order, set_shop_order_status,
    };
    use crate::error::AppError;
    use crate::engine::lifecycle::TransitionError;
    use crate::models::cart::CartLine;
    use crate::models::order::{Address, PlaceOrderRequest, ShopOrderStatus};
    use crate::state::AppState;

    fn two_shop_request(customer_id: Uuid) -> PlaceOrderRequest {
        let line = |shop: u128, item: u128| CartLine {
            item_id: Uuid::from_u128(item),
            shop_id: Uuid::from_u128(shop),
            name: format!("item-{item}"),
            unit_price: Decimal::new(10, 0),
            quantity: 1,
            image: None,
        };
        PlaceOrderRequest {
            customer_id,
            address: Address {
                text: "221B Baker Street".to_string(),
                latitude: 51.5237,
                longitude: -0.1585,
            },
            lines: vec![line(1, 10), line(2, 20)],
        }
    }

    #[test]
    fn shop_orders_move_independently() {
        let state = AppState::new(16);
        let order = place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        let shop_a = order.shop_orders[0].id;
        let shop_b = order.shop_orders[1].id;

        assign_courier(&state, shop_a, Uuid::new_v4()).unwrap();
        let err = set_shop_order_status(&state, shop_a, ShopOrderStatus::Delivered, None).unwrap_err();

        assert!(matches!(
            err,
            AppError::Transition(TransitionError::InvalidTransition { .. })
        ));

        let stored = get_order(&state, order.id, None).unwrap();
        assert_eq!(
            stored.shop_order(shop_a).unwrap().status,
            ShopOrderStatus::Assigned
        );
        assert_eq!(
            stored.shop_order(shop_b).unwrap().status,
            ShopOrderStatus::Pending
        );
    }

    #[test]
    fn foreign_customer_is_unauthorized() {
        let state = AppState::new(16);
        let order = place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();

        let err = get_order(&state, order.id, Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(get_order(&state, order.id, Some(order.customer_id)).is_ok());
    }

    #[test]
    fn only_the_assigned_courier_may_advance() {
        let state = AppState::new(16);
        let order = place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        let shop_order_id = order.shop_orders[0].id;
        let courier = Uuid::new_v4();
        assign_courier(&state, shop_order_id, courier).unwrap();

        let err = set_shop_order_status(
            &state,
            shop_order_id,
            ShopOrderStatus::OutForDelivery,
            Some(Uuid::new_v4()),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let updated = set_shop_order_status(
            &state,
            shop_order_id,
            ShopOrderStatus::OutForDelivery,
            Some(courier),
        )
        .unwrap();
        assert_eq!(updated.status, ShopOrderStatus::OutForDelivery);
    }

    #[test]
    fn accepted_transitions_are_broadcast() {
        let state = AppState::new(16);
        let mut events = state.events_tx.subscribe();
        let order = place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        let courier = Uuid::new_v4();

        assign_courier(&state, order.shop_orders[1].id, courier).unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.order_id, order.id);
        assert_eq!(event.status, ShopOrderStatus::Assigned);
        assert_eq!(event.courier_id, Some(courier));
    }

    #[test]
    fn pending_queue_lists_only_matching_shop_and_status() {
        let state = AppState::new(16);
        let order = place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        assign_courier(&state, order.shop_orders[0].id, Uuid::new_v4()).unwrap();

        let pending = list_shop_orders_for_shop(
            &state,
            Uuid::from_u128(1),
            Some(ShopOrderStatus::Pending),
        );
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].order_id, order.id);

        let all = list_shop_orders_for_shop(&state, Uuid::from_u128(1), None);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn indexed_shop_orders_always_resolve_during_checkout() {
        let state = Arc::new(AppState::new(16));
        let done = Arc::new(AtomicBool::new(false));

        let watcher = {
            let state = Arc::clone(&state);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checked = 0_usize;
                while !done.load(Ordering::Acquire) {
                    let indexed: Vec<(Uuid, Uuid)> = state
                        .shop_order_index
                        .iter()
                        .map(|entry| (*entry.key(), *entry.value()))
                        .collect();
                    for (shop_order_id, order_id) in indexed {
                        assert!(
                            state.orders.contains_key(&order_id),
                            "shop order {shop_order_id} indexed before order {order_id} was stored"
                        );
                        checked += 1;
                    }
                }
                checked
            })
        };

        for _ in 0..200 {
            place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        }
        done.store(true, Ordering::Release);

        watcher.join().unwrap();
        assert_eq!(state.shop_order_index.len(), 400);
    }

    #[test]
    fn status_requests_without_an_edge_are_rejected() {
        let state = AppState::new(16);
        let order = place_order(&state, two_shop_request(Uuid::new_v4())).unwrap();
        let shop_order_id = order.shop_orders[0].id;

        let err = set_shop_order_status(&state, shop_order_id, ShopOrderStatus::Pending, None)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Transition(TransitionError::InvalidTransition {
                from: ShopOrderStatus::Pending,
                ..
            })
        ));

        let err = set_shop_order_status(&state, shop_order_id, ShopOrderStatus::Assigned, None)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
