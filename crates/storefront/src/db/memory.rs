//! In-memory implementation of every store trait.
//!
//! Used by unit and integration tests to drive services without `PostgreSQL`.
//! It enforces the same uniqueness rules as the schema: unique username,
//! email and OTP secret, and one unplaced order per `(user, product)`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use cartwheel_core::{Email, OrderId, OrderItemId, ProductId, Quantity, UserId, Username};

use super::{AccountStore, CatalogStore, OrderStore, RepositoryError};
use crate::models::order::{CartItem, Order, OrderItem, Placement};
use crate::models::product::{NewProduct, Product};
use crate::models::user::{NewUser, User};

#[derive(Debug, Default)]
struct Inner {
    users: Vec<(User, String)>,
    products: Vec<Product>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    next_id: i32,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    fn placement(&self, user_id: UserId, placement_id: Uuid) -> Option<Placement> {
        let orders: Vec<&Order> = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.placement_id == Some(placement_id))
            .collect();
        let first = orders.first()?;

        let items = self
            .items
            .iter()
            .filter(|item| orders.iter().any(|o| o.id == item.order_id))
            .map(|item| {
                let mut item = item.clone();
                if let Some(p) = self.product(item.product_id) {
                    item.product_name.clone_from(&p.name);
                }
                item
            })
            .collect();

        Some(Placement {
            placement_id,
            placed_at: first.placed_at.unwrap_or_else(Utc::now),
            items,
            payment_intent_id: orders.iter().find_map(|o| o.payment_intent_id.clone()),
        })
    }
}

/// Thread-safe in-memory store.
///
/// Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    /// Every order row, placed or not, for assertions.
    pub async fn orders(&self) -> Vec<Order> {
        self.inner.lock().await.orders.clone()
    }
}

impl AccountStore for MemoryStore {
    async fn create_user(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.users.iter().any(|(u, _)| u.username == new.username) {
            return Err(RepositoryError::Conflict("username".to_owned()));
        }
        if inner.users.iter().any(|(u, _)| u.email == new.email) {
            return Err(RepositoryError::Conflict("email".to_owned()));
        }

        let user = User {
            id: UserId::new(inner.next_id()),
            username: new.username.clone(),
            email: new.email.clone(),
            is_active: true,
            otp_secret: None,
            created_at: Utc::now(),
        };
        inner.users.push((user.clone(), new.password_hash.clone()));
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().find(|(u, _)| u.id == id).map(|(u, _)| u.clone()))
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|(u, _)| &u.email == email)
            .map(|(u, _)| u.clone()))
    }

    async fn username_taken(&self, username: &Username) -> Result<bool, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().any(|(u, _)| &u.username == username))
    }

    async fn email_taken(&self, email: &Email) -> Result<bool, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.iter().any(|(u, _)| &u.email == email))
    }

    async fn password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(_, hash)| hash.clone()))
    }

    async fn set_otp_secret(&self, id: UserId, secret: &str) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .iter()
            .any(|(u, _)| u.id != id && u.otp_secret.as_deref() == Some(secret))
        {
            return Err(RepositoryError::Conflict("otp_secret".to_owned()));
        }
        let (user, _) = inner
            .users
            .iter_mut()
            .find(|(u, _)| u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.otp_secret = Some(secret.to_owned());
        Ok(())
    }
}

impl CatalogStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut products = inner.products.clone();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.lock().await.product(id).cloned())
    }

    async fn insert_product(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let product = Product {
            id: ProductId::new(inner.next_id()),
            name: new.name.clone(),
            price: new.price,
            description: new.description.clone(),
            image: new.image.clone(),
        };
        inner.products.push(product.clone());
        Ok(product)
    }
}

impl OrderStore for MemoryStore {
    async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.product(product_id).is_none() {
            return Err(RepositoryError::NotFound);
        }

        if let Some(order) = inner
            .orders
            .iter_mut()
            .find(|o| o.user_id == user_id && o.product_id == product_id && !o.is_placed)
        {
            order.quantity = order.quantity.incremented();
            return Ok(order.clone());
        }

        let order = Order {
            id: OrderId::new(inner.next_id()),
            user_id,
            product_id,
            quantity: Quantity::ONE,
            is_placed: false,
            placement_id: None,
            placed_at: None,
            payment_intent_id: None,
        };
        inner.orders.push(order.clone());
        Ok(order)
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let line = inner
            .orders
            .iter_mut()
            .find(|o| o.user_id == user_id && o.product_id == product_id && !o.is_placed);
        Ok(line.map(|o| o.quantity = quantity).is_some())
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let before = inner.orders.len();
        inner
            .orders
            .retain(|o| !(o.user_id == user_id && o.product_id == product_id && !o.is_placed));
        Ok(inner.orders.len() < before)
    }

    async fn cart_items(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut lines: Vec<&Order> = inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && !o.is_placed)
            .collect();
        lines.sort_by_key(|o| o.id);

        lines
            .into_iter()
            .map(|order| {
                let product = inner.product(order.product_id).cloned().ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "order {} references missing product",
                        order.id
                    ))
                })?;
                Ok(CartItem {
                    order: order.clone(),
                    product,
                })
            })
            .collect()
    }

    async fn place_cart(&self, user_id: UserId) -> Result<Option<Placement>, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let placement_id = Uuid::new_v4();
        let now = Utc::now();

        let mut lines: Vec<(OrderId, ProductId, Quantity)> = inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && !o.is_placed)
            .map(|o| (o.id, o.product_id, o.quantity))
            .collect();
        if lines.is_empty() {
            return Ok(None);
        }
        lines.sort_by_key(|(id, _, _)| *id);

        // Snapshot every line before flipping any of them.
        let mut snapshots = Vec::with_capacity(lines.len());
        for (order_id, product_id, quantity) in lines {
            let product = inner.product(product_id).cloned().ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "order {order_id} references missing product"
                ))
            })?;
            snapshots.push((order_id, product_id, quantity, product));
        }

        for order in inner
            .orders
            .iter_mut()
            .filter(|o| o.user_id == user_id && !o.is_placed)
        {
            order.is_placed = true;
            order.placement_id = Some(placement_id);
            order.placed_at = Some(now);
        }
        for (order_id, product_id, quantity, product) in snapshots {
            let id = OrderItemId::new(inner.next_id());
            inner.items.push(OrderItem {
                id,
                order_id,
                product_id,
                product_name: product.name,
                quantity,
                unit_price: product.price,
            });
        }

        Ok(inner.placement(user_id, placement_id))
    }

    async fn latest_placement(
        &self,
        user_id: UserId,
    ) -> Result<Option<Placement>, RepositoryError> {
        let inner = self.inner.lock().await;
        let latest = inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.is_placed)
            .max_by_key(|o| (o.placed_at, o.id))
            .and_then(|o| o.placement_id);

        Ok(latest.and_then(|id| inner.placement(user_id, id)))
    }

    async fn attach_payment_intent(
        &self,
        user_id: UserId,
        placement_id: Uuid,
        intent_id: &str,
    ) -> Result<u64, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let mut updated = 0;
        for order in inner
            .orders
            .iter_mut()
            .filter(|o| o.user_id == user_id && o.is_placed && o.placement_id == Some(placement_id))
        {
            order.payment_intent_id = Some(intent_id.to_owned());
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            username: Username::parse(name).unwrap(),
            email: Email::parse(email).unwrap(),
            password_hash: "hash".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let store = MemoryStore::new();
        store.create_user(&new_user("ann", "ann@example.com")).await.unwrap();

        let dup_name = store.create_user(&new_user("ann", "other@example.com")).await;
        assert!(matches!(dup_name, Err(RepositoryError::Conflict(ref f)) if f == "username"));

        let dup_email = store.create_user(&new_user("bob", "ann@example.com")).await;
        assert!(matches!(dup_email, Err(RepositoryError::Conflict(ref f)) if f == "email"));

        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_unique_otp_secret() {
        let store = MemoryStore::new();
        let a = store.create_user(&new_user("a", "a@example.com")).await.unwrap();
        let b = store.create_user(&new_user("b", "b@example.com")).await.unwrap();

        store.set_otp_secret(a.id, "SECRET").await.unwrap();
        assert!(store.set_otp_secret(b.id, "SECRET").await.is_err());
        assert!(matches!(
            store.set_otp_secret(UserId::new(999), "OTHER").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_add_item_unknown_product() {
        let store = MemoryStore::new();
        let result = store.add_item(UserId::new(1), ProductId::new(42)).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_placed_rows_are_not_cart_lines() {
        let store = MemoryStore::new();
        let product = store
            .insert_product(&NewProduct {
                name: "Mug".to_owned(),
                price: Decimal::new(500, 2),
                description: String::new(),
                image: String::new(),
            })
            .await
            .unwrap();
        let user = UserId::new(100);

        store.add_item(user, product.id).await.unwrap();
        store.place_cart(user).await.unwrap().unwrap();

        // A placed row is never touched by cart mutations.
        assert!(!store.remove_item(user, product.id).await.unwrap());
        let fresh = store.add_item(user, product.id).await.unwrap();
        assert_eq!(fresh.quantity, Quantity::ONE);
        assert_eq!(store.orders().await.len(), 2);
    }

    async fn mug(store: &MemoryStore) -> Product {
        store
            .insert_product(&NewProduct {
                name: "Mug".to_owned(),
                price: Decimal::new(500, 2),
                description: String::new(),
                image: String::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_item_saturates_at_max_quantity() {
        let store = MemoryStore::new();
        let product = mug(&store).await;
        let user = UserId::new(1);

        store.add_item(user, product.id).await.unwrap();
        let max = Quantity::new(i64::from(i32::MAX)).unwrap();
        assert!(store.set_quantity(user, product.id, max).await.unwrap());

        let order = store.add_item(user, product.id).await.unwrap();
        assert_eq!(order.quantity, max);
    }

    #[tokio::test]
    async fn test_failed_placement_leaves_cart_untouched() {
        let store = MemoryStore::new();
        let product = mug(&store).await;
        let user = UserId::new(1);
        store.add_item(user, product.id).await.unwrap();

        store.inner.lock().await.products.clear();

        let result = store.place_cart(user).await;
        assert!(matches!(result, Err(RepositoryError::DataCorruption(_))));
        assert!(store.orders().await.iter().all(|o| !o.is_placed));
        assert!(store.inner.lock().await.items.is_empty());
        assert!(store.latest_placement(user).await.unwrap().is_none());
    }
}
