//! Cart and order placement.
//!
//! A user's cart moves through `Empty -> InCart -> Placed`. Cart mutations only
//! touch unplaced orders; [`CartService::place_order`] flips the whole cart in
//! one transaction and snapshots prices so later catalog edits do not change
//! what was ordered.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use cartwheel_core::{CartState, ProductId, Quantity, QuantityError, UserId};

use crate::db::{CatalogStore, OrderStore, RepositoryError};
use crate::models::order::{CartItem, LineItem, Order, Placement};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// A requested quantity was negative or out of range.
    #[error("invalid quantity for product {product_id}: {source}")]
    InvalidQuantity {
        product_id: ProductId,
        source: QuantityError,
    },

    /// Placement was attempted with nothing in the cart.
    #[error("cannot place an order with an empty cart")]
    EmptyCart,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Sum of `unit_price * quantity` over `items`.
///
/// ```
/// # use cartwheel_storefront::services::cart::calculate_total_amount;
/// # use cartwheel_storefront::models::LineItem;
/// # use cartwheel_core::Quantity;
/// # use rust_decimal::Decimal;
/// struct Line(Decimal, i64);
/// impl LineItem for Line {
///     fn unit_price(&self) -> Decimal { self.0 }
///     fn quantity(&self) -> Quantity { Quantity::new(self.1).unwrap() }
/// }
///
/// let lines = [Line(Decimal::new(1000, 2), 2), Line(Decimal::new(2000, 2), 1)];
/// assert_eq!(calculate_total_amount(&lines), Decimal::new(4000, 2));
/// ```
#[must_use]
pub fn calculate_total_amount<T: LineItem>(items: &[T]) -> Decimal {
    items.iter().map(LineItem::line_total).sum()
}

/// Cart operations for a single request.
pub struct CartService<'a, C, O> {
    catalog: &'a C,
    orders: &'a O,
}

impl<'a, C: CatalogStore, O: OrderStore> CartService<'a, C, O> {
    /// Create a cart service over the given stores.
    #[must_use]
    pub const fn new(catalog: &'a C, orders: &'a O) -> Self {
        Self { catalog, orders }
    }

    /// Add one unit of `product_id` to the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Order, CartError> {
        if self.catalog.find_product(product_id).await?.is_none() {
            return Err(CartError::ProductNotFound(product_id));
        }

        let order = self
            .orders
            .add_item(user_id, product_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CartError::ProductNotFound(product_id),
                other => CartError::Repository(other),
            })?;

        tracing::debug!(quantity = %order.quantity, "Added to cart");
        Ok(order)
    }

    /// Set the quantity of one cart line.
    ///
    /// Zero removes the line. Returns `false` if the product is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for negative or oversized values.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        new_quantity: i64,
    ) -> Result<bool, CartError> {
        match parse_quantity(product_id, new_quantity)? {
            Some(quantity) => Ok(self
                .orders
                .set_quantity(user_id, product_id, quantity)
                .await?),
            None => Ok(self.orders.remove_item(user_id, product_id).await?),
        }
    }

    /// Apply a batch of quantity changes from the cart form.
    ///
    /// Every value is validated before anything is written, so one bad value
    /// leaves the whole cart unchanged. Lines not mentioned keep their
    /// quantity; entries for products no longer in the cart are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for the first invalid value.
    #[instrument(skip(self, quantities), fields(lines = quantities.len()))]
    pub async fn update_quantities(
        &self,
        user_id: UserId,
        quantities: &BTreeMap<ProductId, i64>,
    ) -> Result<(), CartError> {
        let parsed = quantities
            .iter()
            .map(|(&product_id, &value)| {
                parse_quantity(product_id, value).map(|q| (product_id, q))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (product_id, quantity) in parsed {
            match quantity {
                Some(quantity) => {
                    self.orders
                        .set_quantity(user_id, product_id, quantity)
                        .await?;
                }
                None => {
                    self.orders.remove_item(user_id, product_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Remove a product from the cart. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the delete fails.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, CartError> {
        Ok(self.orders.remove_item(user_id, product_id).await?)
    }

    /// The user's cart lines, ordered by order ID.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn get_cart_items(&self, user_id: UserId) -> Result<Vec<CartItem>, CartError> {
        Ok(self.orders.cart_items(user_id).await?)
    }

    /// Place every cart line as one order batch.
    ///
    /// # Errors
    ///
    /// Returns `CartError::EmptyCart` if there is nothing to place; no state
    /// changes in that case.
    #[instrument(skip(self))]
    pub async fn place_order(&self, user_id: UserId) -> Result<Placement, CartError> {
        let placement = self
            .orders
            .place_cart(user_id)
            .await?
            .ok_or(CartError::EmptyCart)?;

        tracing::info!(
            placement_id = %placement.placement_id,
            lines = placement.items.len(),
            total = %placement.total(),
            "Order placed"
        );
        Ok(placement)
    }

    /// The most recently placed batch.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the query fails.
    pub async fn latest_placement(&self, user_id: UserId) -> Result<Option<Placement>, CartError> {
        Ok(self.orders.latest_placement(user_id).await?)
    }

    /// Where the user's cart stands.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn cart_state(&self, user_id: UserId) -> Result<CartState, CartError> {
        let lines = self.orders.cart_items(user_id).await?.len();
        let has_placed = lines == 0 && self.orders.latest_placement(user_id).await?.is_some();
        Ok(CartState::from_counts(lines, has_placed))
    }
}

/// `Some(quantity)` to set, `None` to remove.
fn parse_quantity(product_id: ProductId, value: i64) -> Result<Option<Quantity>, CartError> {
    if value == 0 {
        return Ok(None);
    }
    Quantity::new(value)
        .map(Some)
        .map_err(|source| CartError::InvalidQuantity { product_id, source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::product::NewProduct;

    async fn seeded() -> (MemoryStore, ProductId, ProductId) {
        let store = MemoryStore::new();
        let basket = store
            .insert_product(&NewProduct {
                name: "The Essentials Basket".to_owned(),
                price: Decimal::new(1000, 2),
                description: String::new(),
                image: String::new(),
            })
            .await
            .unwrap();
        let shirt = store
            .insert_product(&NewProduct {
                name: "The Classic Buttoned Shirt".to_owned(),
                price: Decimal::new(2000, 2),
                description: String::new(),
                image: String::new(),
            })
            .await
            .unwrap();
        (store, basket.id, shirt.id)
    }

    const USER: UserId = UserId::new(500);

    #[tokio::test]
    async fn test_adding_twice_increments() {
        let (store, basket, _) = seeded().await;
        let cart = CartService::new(&store, &store);

        cart.add_to_cart(USER, basket).await.unwrap();
        cart.add_to_cart(USER, basket).await.unwrap();

        let items = cart.get_cart_items(USER).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].order.quantity.get(), 2);
    }

    #[tokio::test]
    async fn test_add_unknown_product() {
        let (store, _, _) = seeded().await;
        let cart = CartService::new(&store, &store);

        let err = cart.add_to_cart(USER, ProductId::new(9999)).await.unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(id) if id.as_i32() == 9999));
        assert!(cart.get_cart_items(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let (store, basket, shirt) = seeded().await;
        let cart = CartService::new(&store, &store);
        cart.add_to_cart(USER, basket).await.unwrap();

        assert!(!cart.remove_from_cart(USER, shirt).await.unwrap());
        assert_eq!(cart.get_cart_items(USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_quantity_zero_removes_negative_rejected() {
        let (store, basket, shirt) = seeded().await;
        let cart = CartService::new(&store, &store);
        cart.add_to_cart(USER, basket).await.unwrap();
        cart.add_to_cart(USER, shirt).await.unwrap();

        assert!(cart.update_quantity(USER, basket, 5).await.unwrap());
        assert!(cart.update_quantity(USER, shirt, 0).await.unwrap());
        let err = cart.update_quantity(USER, basket, -1).await.unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity { .. }));

        let items = cart.get_cart_items(USER).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.id, basket);
        assert_eq!(items[0].order.quantity.get(), 5);
    }

    #[tokio::test]
    async fn test_update_quantities_is_all_or_nothing() {
        let (store, basket, shirt) = seeded().await;
        let cart = CartService::new(&store, &store);
        cart.add_to_cart(USER, basket).await.unwrap();
        cart.add_to_cart(USER, shirt).await.unwrap();

        let bad = BTreeMap::from([(basket, 3), (shirt, -2)]);
        assert!(cart.update_quantities(USER, &bad).await.is_err());
        let items = cart.get_cart_items(USER).await.unwrap();
        assert!(items.iter().all(|i| i.order.quantity == Quantity::ONE));

        // Unmentioned lines are left alone.
        let good = BTreeMap::from([(basket, 3)]);
        cart.update_quantities(USER, &good).await.unwrap();
        let items = cart.get_cart_items(USER).await.unwrap();
        assert_eq!(items[0].order.quantity.get(), 3);
        assert_eq!(items[1].order.quantity.get(), 1);
    }

    #[tokio::test]
    async fn test_place_empty_cart_fails() {
        let (store, _, _) = seeded().await;
        let cart = CartService::new(&store, &store);

        let err = cart.place_order(USER).await.unwrap_err();
        assert!(matches!(err, CartError::EmptyCart));
        assert_eq!(cart.cart_state(USER).await.unwrap(), CartState::Empty);
        assert!(store.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_place_flips_every_line() {
        let (store, basket, shirt) = seeded().await;
        let cart = CartService::new(&store, &store);
        cart.add_to_cart(USER, basket).await.unwrap();
        cart.add_to_cart(USER, basket).await.unwrap();
        cart.add_to_cart(USER, shirt).await.unwrap();
        assert_eq!(cart.cart_state(USER).await.unwrap(), CartState::InCart);

        let placement = cart.place_order(USER).await.unwrap();
        assert_eq!(placement.items.len(), 2);
        assert_eq!(placement.total(), Decimal::new(4000, 2));

        assert!(cart.get_cart_items(USER).await.unwrap().is_empty());
        assert!(store.orders().await.iter().all(|o| o.is_placed
            && o.placement_id == Some(placement.placement_id)));
        assert_eq!(cart.cart_state(USER).await.unwrap(), CartState::Placed);
    }

    #[tokio::test]
    async fn test_new_activity_after_placement_starts_fresh_batch() {
        let (store, basket, _) = seeded().await;
        let cart = CartService::new(&store, &store);
        cart.add_to_cart(USER, basket).await.unwrap();
        let first = cart.place_order(USER).await.unwrap();

        cart.add_to_cart(USER, basket).await.unwrap();
        assert_eq!(cart.cart_state(USER).await.unwrap(), CartState::InCart);
        let second = cart.place_order(USER).await.unwrap();

        assert_ne!(first.placement_id, second.placement_id);
        let latest = cart.latest_placement(USER).await.unwrap().unwrap();
        assert_eq!(latest.placement_id, second.placement_id);
    }

    #[tokio::test]
    async fn test_carts_are_per_user() {
        let (store, basket, _) = seeded().await;
        let cart = CartService::new(&store, &store);
        let other = UserId::new(501);

        cart.add_to_cart(USER, basket).await.unwrap();
        cart.add_to_cart(other, basket).await.unwrap();
        cart.place_order(USER).await.unwrap();

        assert_eq!(cart.get_cart_items(other).await.unwrap().len(), 1);
    }

    #[test]
    fn test_calculate_total_amount_over_cart_items() {
        use crate::models::order::Order;
        use crate::models::product::Product;

        let line = |price: i64, qty: i64| CartItem {
            order: Order {
                id: cartwheel_core::OrderId::new(1),
                user_id: USER,
                product_id: ProductId::new(1),
                quantity: Quantity::new(qty).unwrap(),
                is_placed: false,
                placement_id: None,
                placed_at: None,
                payment_intent_id: None,
            },
            product: Product {
                id: ProductId::new(1),
                name: String::new(),
                price: Decimal::new(price, 2),
                description: String::new(),
                image: String::new(),
            },
        };

        let items = [line(1000, 2), line(2000, 1)];
        assert_eq!(calculate_total_amount(&items), Decimal::new(4000, 2));
        assert_eq!(calculate_total_amount::<CartItem>(&[]), Decimal::ZERO);
    }
}
