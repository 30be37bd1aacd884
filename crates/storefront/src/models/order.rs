//! Cart and order types.
//!
//! An [`Order`] row doubles as a cart line while `is_placed` is false. Placing
//! the cart flips every line at once and snapshots its unit price into an
//! [`OrderItem`]; a [`Placement`] groups those snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use cartwheel_core::{OrderId, OrderItemId, ProductId, Quantity, UserId};

use super::product::Product;

/// An order row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Monotonic: never returns to `false` once set.
    pub is_placed: bool,
    /// Shared by every row flipped in the same placement.
    pub placement_id: Option<Uuid>,
    pub placed_at: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
}

/// An unplaced order joined with its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub order: Order,
    pub product: Product,
}

/// Price snapshot of one placed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Product name at read time, for display.
    pub product_name: String,
    pub quantity: Quantity,
    /// Unit price at placement time.
    pub unit_price: Decimal,
}

/// One placed batch of orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub placement_id: Uuid,
    pub placed_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    /// Set once a payment intent has been created for this batch.
    pub payment_intent_id: Option<String>,
}

impl Placement {
    /// Total of the snapshot prices.
    #[must_use]
    pub fn total(&self) -> Decimal {
        crate::services::cart::calculate_total_amount(&self.items)
    }
}

/// Anything with a unit price and a quantity.
pub trait LineItem {
    fn unit_price(&self) -> Decimal;

    fn quantity(&self) -> Quantity;

    /// `unit_price * quantity`.
    fn line_total(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.quantity().get())
    }
}

/// Cart lines are priced at the live product price.
impl LineItem for CartItem {
    fn unit_price(&self) -> Decimal {
        self.product.price
    }

    fn quantity(&self) -> Quantity {
        self.order.quantity
    }
}

/// Placed lines are priced at the snapshot.
impl LineItem for OrderItem {
    fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }
}
