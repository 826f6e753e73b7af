//! Shop order state machine.
//!
//! ```text
//! pending --assign(courier)--> assigned --start_delivery--> out_for_delivery --mark_delivered--> delivered
//! pending | assigned --cancel--> cancelled
//! ```
//!
//! `delivered` and `cancelled` are terminal. Every shop order moves on its own;
//! nothing here looks at sibling shop orders of the same order.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::{ShopOrder, ShopOrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Assign(Uuid),
    StartDelivery,
    MarkDelivered,
    Cancel,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Assign(_) => "assign",
            Transition::StartDelivery => "start_delivery",
            Transition::MarkDelivered => "mark_delivered",
            Transition::Cancel => "cancel",
        }
    }

    pub fn target(&self) -> ShopOrderStatus {
        match self {
            Transition::Assign(_) => ShopOrderStatus::Assigned,
            Transition::StartDelivery => ShopOrderStatus::OutForDelivery,
            Transition::MarkDelivered => ShopOrderStatus::Delivered,
            Transition::Cancel => ShopOrderStatus::Cancelled,
        }
    }

    /// Maps a requested status onto the transition that reaches it.
    ///
    /// `assigned` needs a courier and `pending` has no incoming edge, so both
    /// return `None`.
    pub fn towards(status: ShopOrderStatus) -> Option<Transition> {
        match status {
            ShopOrderStatus::OutForDelivery => Some(Transition::StartDelivery),
            ShopOrderStatus::Delivered => Some(Transition::MarkDelivered),
            ShopOrderStatus::Cancelled => Some(Transition::Cancel),
            ShopOrderStatus::Pending | ShopOrderStatus::Assigned => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} a shop order that is {from}")]
    InvalidTransition {
        from: ShopOrderStatus,
        action: &'static str,
    },

    #[error("shop order is already assigned to courier {courier_id}")]
    AlreadyAssigned { courier_id: Uuid },
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::InvalidTransition { .. } => "invalid_transition",
            TransitionError::AlreadyAssigned { .. } => "already_assigned",
        }
    }
}

/// Applies `transition` to `shop_order` in place and returns the previous status.
///
/// On error the shop order is left untouched.
pub fn apply_transition(
    shop_order: &mut ShopOrder,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<ShopOrderStatus, TransitionError> {
    let from = shop_order.status;
    let invalid = TransitionError::InvalidTransition {
        from,
        action: transition.name(),
    };

    if from.is_terminal() {
        return Err(invalid);
    }

    let courier_id = match (transition, from) {
        (Transition::Assign(courier_id), ShopOrderStatus::Pending) => Some(courier_id),
        (Transition::Assign(_), _) => {
            return Err(match shop_order.assigned_courier_id {
                Some(courier_id) => TransitionError::AlreadyAssigned { courier_id },
                None => invalid,
            });
        }
        (Transition::StartDelivery, ShopOrderStatus::Assigned) => {
            Some(shop_order.assigned_courier_id.ok_or(invalid)?)
        }
        (Transition::MarkDelivered, ShopOrderStatus::OutForDelivery) => {
            Some(shop_order.assigned_courier_id.ok_or(invalid)?)
        }
        (Transition::Cancel, ShopOrderStatus::Pending | ShopOrderStatus::Assigned) => None,
        _ => return Err(invalid),
    };

    shop_order.status = transition.target();
    shop_order.assigned_courier_id = courier_id;
    shop_order.updated_at = now;

    Ok(from)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{apply_transition, Transition, TransitionError};
    use crate::models::order::{OrderLine, ShopOrder, ShopOrderStatus};

    fn shop_order() -> ShopOrder {
        ShopOrder::new(
            Uuid::new_v4(),
            vec![OrderLine {
                item_id: Uuid::new_v4(),
                name: "masala dosa".to_string(),
                quantity: 1,
                unit_price: Decimal::new(120, 0),
            }],
            Utc::now(),
        )
    }

    fn in_status(status: ShopOrderStatus) -> ShopOrder {
        let mut so = shop_order();
        so.status = status;
        if status.has_courier() {
            so.assigned_courier_id = Some(Uuid::from_u128(7));
        }
        so
    }

    fn is_edge(from: ShopOrderStatus, transition: Transition) -> bool {
        use ShopOrderStatus::*;
        matches!(
            (from, transition),
            (Pending, Transition::Assign(_))
                | (Assigned, Transition::StartDelivery)
                | (OutForDelivery, Transition::MarkDelivered)
                | (Pending | Assigned, Transition::Cancel)
        )
    }

    #[test]
    fn accepts_exactly_the_graph_edges() {
        let transitions = [
            Transition::Assign(Uuid::from_u128(9)),
            Transition::StartDelivery,
            Transition::MarkDelivered,
            Transition::Cancel,
        ];

        for from in ShopOrderStatus::ALL {
            for transition in transitions {
                let mut so = in_status(from);
                let before = so.clone();
                let result = apply_transition(&mut so, transition, Utc::now());

                if is_edge(from, transition) {
                    assert_eq!(result, Ok(from), "{from} -> {}", transition.name());
                    assert_eq!(so.status, transition.target());
                    assert!(so.validate().is_ok());
                } else {
                    assert!(result.is_err(), "{from} -> {} accepted", transition.name());
                    assert_eq!(so, before);
                }
            }
        }
    }

    #[test]
    fn full_delivery_path_keeps_courier() {
        let courier = Uuid::new_v4();
        let mut so = shop_order();

        apply_transition(&mut so, Transition::Assign(courier), Utc::now()).unwrap();
        apply_transition(&mut so, Transition::StartDelivery, Utc::now()).unwrap();
        apply_transition(&mut so, Transition::MarkDelivered, Utc::now()).unwrap();

        assert_eq!(so.status, ShopOrderStatus::Delivered);
        assert_eq!(so.assigned_courier_id, Some(courier));
    }

    #[test]
    fn second_assign_is_rejected_regardless_of_courier() {
        let first = Uuid::new_v4();
        let mut so = shop_order();
        apply_transition(&mut so, Transition::Assign(first), Utc::now()).unwrap();

        for courier in [first, Uuid::new_v4()] {
            let err = apply_transition(&mut so, Transition::Assign(courier), Utc::now()).unwrap_err();
            assert_eq!(err, TransitionError::AlreadyAssigned { courier_id: first });
        }
        assert_eq!(so.assigned_courier_id, Some(first));
    }

    #[test]
    fn assign_on_terminal_shop_order_is_invalid_transition() {
        let mut so = in_status(ShopOrderStatus::Delivered);
        let err = apply_transition(&mut so, Transition::Assign(Uuid::new_v4()), Utc::now()).unwrap_err();

        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn mark_delivered_without_start_delivery_is_rejected() {
        let mut so = shop_order();
        apply_transition(&mut so, Transition::Assign(Uuid::new_v4()), Utc::now()).unwrap();

        let err = apply_transition(&mut so, Transition::MarkDelivered, Utc::now()).unwrap_err();

        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: ShopOrderStatus::Assigned,
                action: "mark_delivered",
            }
        );
        assert_eq!(so.status, ShopOrderStatus::Assigned);
    }

    #[test]
    fn cancel_clears_courier() {
        let mut so = shop_order();
        apply_transition(&mut so, Transition::Assign(Uuid::new_v4()), Utc::now()).unwrap();
        apply_transition(&mut so, Transition::Cancel, Utc::now()).unwrap();

        assert_eq!(so.status, ShopOrderStatus::Cancelled);
        assert_eq!(so.assigned_courier_id, None);
    }

    #[test]
    fn towards_has_no_edge_into_pending_or_assigned() {
        assert_eq!(Transition::towards(ShopOrderStatus::Pending), None);
        assert_eq!(Transition::towards(ShopOrderStatus::Assigned), None);
        assert_eq!(
            Transition::towards(ShopOrderStatus::Delivered),
            Some(Transition::MarkDelivered)
        );
    }
}
