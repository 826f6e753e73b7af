//! Client-owned cart.
//!
//! [`Cart`] is a pure reducer over cart lines keyed by item id. [`CartStore`]
//! wraps it in a `watch` channel so views can read the current cart and be
//! woken on change, while every mutation still goes through the reducer.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::cart::CartLine;
use crate::models::order::{Address, PlaceOrderRequest};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("invalid quantity {quantity} for item {item_id}")]
    InvalidQuantity { item_id: Uuid, quantity: i64 },

    #[error("cart total would overflow after changing item {item_id}")]
    AmountTooLarge { item_id: Uuid },
}

impl CartError {
    pub fn code(&self) -> &'static str {
        match self {
            CartError::InvalidQuantity { .. } => "invalid_quantity",
            CartError::AmountTooLarge { .. } => "amount_too_large",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    AddItem(CartLine),
    SetQuantity { item_id: Uuid, quantity: i64 },
    RemoveItem(Uuid),
    Clear,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines in insertion order.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, item_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.item_id == item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Consumes the cart and returns the next one.
    pub fn reduce(mut self, action: CartAction) -> Result<Self, CartError> {
        self.apply(action)?;
        Ok(self)
    }

    /// In-place form of [`Cart::reduce`]. Returns whether anything changed.
    ///
    /// A rejected action leaves the cart as it was.
    pub fn apply(&mut self, action: CartAction) -> Result<bool, CartError> {
        match action {
            CartAction::AddItem(line) => self.add_item(line),
            CartAction::SetQuantity { item_id, quantity } => self.set_quantity(item_id, quantity),
            CartAction::RemoveItem(item_id) => Ok(self.remove_item(item_id)),
            CartAction::Clear => {
                let changed = !self.lines.is_empty();
                self.lines.clear();
                Ok(changed)
            }
        }
    }

    /// Adds `line.quantity` to an existing line for the same item, or inserts
    /// it. A zero quantity is ignored.
    pub fn add_item(&mut self, line: CartLine) -> Result<bool, CartError> {
        if line.quantity == 0 {
            return Ok(false);
        }

        let item_id = line.item_id;
        let mut next = self.lines.clone();
        match next.iter_mut().find(|l| l.item_id == item_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or(CartError::AmountTooLarge { item_id })?;
            }
            None => next.push(line),
        }
        self.commit(item_id, next)
    }

    /// Zero removes the line; negative quantities are rejected.
    pub fn set_quantity(&mut self, item_id: Uuid, quantity: i64) -> Result<bool, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity { item_id, quantity });
        }
        if quantity == 0 {
            return Ok(self.remove_item(item_id));
        }

        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity { item_id, quantity })?;

        let mut next = self.lines.clone();
        match next.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) if line.quantity != quantity => line.quantity = quantity,
            _ => return Ok(false),
        }
        self.commit(item_id, next)
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| line.item_id != item_id);
        self.lines.len() != before
    }

    /// Swaps in `next` only if its total is representable.
    fn commit(&mut self, item_id: Uuid, next: Vec<CartLine>) -> Result<bool, CartError> {
        next.iter()
            .try_fold(Decimal::ZERO, |acc, line| acc.checked_add(line.checked_line_total()?))
            .ok_or(CartError::AmountTooLarge { item_id })?;
        self.lines = next;
        Ok(true)
    }

    /// Checkout payload for the current cart contents.
    pub fn checkout(&self, customer_id: Uuid, address: Address) -> PlaceOrderRequest {
        PlaceOrderRequest {
            customer_id,
            address,
            lines: self.lines.clone(),
        }
    }
}

/// Shared cart container handed to whoever needs the cart.
#[derive(Debug, Clone)]
pub struct CartStore {
    tx: Arc<watch::Sender<Cart>>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::with_cart(Cart::new())
    }

    pub fn with_cart(cart: Cart) -> Self {
        let (tx, _rx) = watch::channel(cart);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Cart {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.tx.subscribe()
    }

    pub fn total(&self) -> Decimal {
        self.tx.borrow().total()
    }

    /// Runs `action` through the reducer. Subscribers are only woken when the
    /// cart actually changed.
    pub fn dispatch(&self, action: CartAction) -> Result<(), CartError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|cart| match cart.apply(action) {
            Ok(changed) => changed,
            Err(err) => {
                outcome = Err(err);
                false
            }
        });
        outcome
    }

    pub fn add_item(&self, line: CartLine) -> Result<(), CartError> {
        self.dispatch(CartAction::AddItem(line))
    }

    pub fn set_quantity(&self, item_id: Uuid, quantity: i64) -> Result<(), CartError> {
        self.dispatch(CartAction::SetQuantity { item_id, quantity })
    }

    pub fn remove_item(&self, item_id: Uuid) {
        let _ = self.dispatch(CartAction::RemoveItem(item_id));
    }

    pub fn clear(&self) {
        let _ = self.dispatch(CartAction::Clear);
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}
