use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::{Order, OrderLine, PlaceOrderRequest, ShopOrder};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("cannot place an order from an empty cart")]
    EmptyCart,

    #[error("item {item_id} has quantity 0")]
    ZeroQuantity { item_id: Uuid },

    #[error("item {item_id} has a negative unit price")]
    NegativePrice { item_id: Uuid },

    #[error("delivery address is missing")]
    MissingAddress,

    #[error("item {item_id} appears with different unit prices")]
    PriceMismatch { item_id: Uuid },

    #[error("order amount is too large")]
    AmountTooLarge,
}

/// Builds an order with one shop order per distinct shop, in the order shops
/// first appear in the cart. Repeated lines for the same item are merged and
/// must agree on the unit price. Every amount of the result is representable.
pub fn build_order(request: PlaceOrderRequest, now: DateTime<Utc>) -> Result<Order, CheckoutError> {
    if request.lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if request.address.text.trim().is_empty() {
        return Err(CheckoutError::MissingAddress);
    }

    let mut partitions: Vec<(Uuid, Vec<OrderLine>)> = Vec::new();

    for line in &request.lines {
        if line.quantity == 0 {
            return Err(CheckoutError::ZeroQuantity {
                item_id: line.item_id,
            });
        }
        if line.unit_price.is_sign_negative() {
            return Err(CheckoutError::NegativePrice {
                item_id: line.item_id,
            });
        }

        let position = partitions
            .iter()
            .position(|(shop_id, _)| *shop_id == line.shop_id)
            .unwrap_or_else(|| {
                partitions.push((line.shop_id, Vec::new()));
                partitions.len() - 1
            });
        let lines = &mut partitions[position].1;

        match lines.iter_mut().find(|existing| existing.item_id == line.item_id) {
            Some(existing) => {
                if existing.unit_price != line.unit_price {
                    return Err(CheckoutError::PriceMismatch {
                        item_id: line.item_id,
                    });
                }
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or(CheckoutError::AmountTooLarge)?;
            }
            None => lines.push(OrderLine::from(line)),
        }
    }

    let shop_orders = partitions
        .into_iter()
        .map(|(shop_id, lines)| ShopOrder::new(shop_id, lines, now))
        .collect();

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: request.customer_id,
        address: request.address,
        shop_orders,
        created_at: now,
    };
    if order.checked_total().is_none() {
        return Err(CheckoutError::AmountTooLarge);
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{build_order, CheckoutError};
    use crate::models::cart::CartLine;
    use crate::models::order::{Address, PlaceOrderRequest, ShopOrderStatus};

    fn cart_line(shop: u128, item: u128, quantity: u32, price: i64) -> CartLine {
        CartLine {
            item_id: Uuid::from_u128(item),
            shop_id: Uuid::from_u128(shop),
            name: format!("item-{item}"),
            unit_price: Decimal::new(price, 0),
            quantity,
            image: None,
        }
    }

    fn request(lines: Vec<CartLine>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_id: Uuid::new_v4(),
            address: Address {
                text: "12 MG Road, Bengaluru".to_string(),
                latitude: 12.9756,
                longitude: 77.6050,
            },
            lines,
        }
    }

    #[test]
    fn partitions_lines_by_shop_in_first_appearance_order() {
        let order = build_order(
            request(vec![
                cart_line(2, 20, 1, 50),
                cart_line(1, 10, 2, 10),
                cart_line(2, 21, 3, 5),
            ]),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.shop_orders.len(), 2);
        assert_eq!(order.shop_orders[0].shop_id, Uuid::from_u128(2));
        assert_eq!(order.shop_orders[0].lines.len(), 2);
        assert_eq!(order.shop_orders[0].subtotal(), Decimal::new(65, 0));
        assert_eq!(order.shop_orders[1].shop_id, Uuid::from_u128(1));
        assert_eq!(order.shop_orders[1].subtotal(), Decimal::new(20, 0));
        assert_eq!(order.total(), Decimal::new(85, 0));
        assert!(order
            .shop_orders
            .iter()
            .all(|so| so.status == ShopOrderStatus::Pending && so.assigned_courier_id.is_none()));
    }

    #[test]
    fn merges_repeated_item_lines() {
        let order = build_order(
            request(vec![cart_line(1, 10, 1, 10), cart_line(1, 10, 2, 10)]),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.shop_orders[0].lines.len(), 1);
        assert_eq!(order.shop_orders[0].lines[0].quantity, 3);
    }

    #[test]
    fn rejects_amounts_that_overflow() {
        let mut line = cart_line(1, 10, 100, 0);
        line.unit_price = Decimal::from_scientific("1e28").unwrap();

        assert_eq!(
            build_order(request(vec![line]), Utc::now()).unwrap_err(),
            CheckoutError::AmountTooLarge
        );

        let mut first = cart_line(1, 10, 1, 0);
        first.unit_price = Decimal::from_scientific("5e28").unwrap();
        let mut second = cart_line(2, 20, 1, 0);
        second.unit_price = Decimal::from_scientific("5e28").unwrap();

        assert_eq!(
            build_order(request(vec![first, second]), Utc::now()).unwrap_err(),
            CheckoutError::AmountTooLarge
        );
    }

    #[test]
    fn rejects_repeated_item_with_another_price() {
        let err = build_order(
            request(vec![cart_line(1, 10, 1, 10), cart_line(1, 10, 1, 12)]),
            Utc::now(),
        )
        .unwrap_err();

        assert_eq!(
            err,
            CheckoutError::PriceMismatch {
                item_id: Uuid::from_u128(10)
            }
        );
    }

    #[test]
    fn rejects_empty_cart_and_zero_quantity() {
        assert_eq!(
            build_order(request(vec![]), Utc::now()).unwrap_err(),
            CheckoutError::EmptyCart
        );
        assert_eq!(
            build_order(request(vec![cart_line(1, 10, 0, 10)]), Utc::now()).unwrap_err(),
            CheckoutError::ZeroQuantity {
                item_id: Uuid::from_u128(10)
            }
        );
    }
}
