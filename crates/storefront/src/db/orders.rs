//! Order repository: cart lines, placement and payment references.
//!
//! Cart lines are `storefront.orders` rows with `is_placed = false`. A partial
//! unique index on `(user_id, product_id) WHERE NOT is_placed` keeps exactly
//! one line per product, and `add_item` upserts against it so concurrent adds
//! cannot create duplicates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use cartwheel_core::{OrderId, OrderItemId, ProductId, Quantity, UserId};

use super::{OrderStore, RepositoryError};
use crate::models::order::{CartItem, Order, OrderItem, Placement};
use crate::models::product::Product;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    product_id: i32,
    quantity: i32,
    is_placed: bool,
    placement_id: Option<Uuid>,
    placed_at: Option<DateTime<Utc>>,
    payment_intent_id: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(i64::from(row.quantity)).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid quantity on order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            quantity,
            is_placed: row.is_placed,
            placement_id: row.placement_id,
            placed_at: row.placed_at,
            payment_intent_id: row.payment_intent_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    #[sqlx(flatten)]
    order: OrderRow,
    product_name: String,
    product_price: Decimal,
    product_description: String,
    product_image: String,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let order = Order::try_from(row.order)?;
        let product = Product {
            id: order.product_id,
            name: row.product_name,
            price: row.product_price,
            description: row.product_description,
            image: row.product_image,
        };
        Ok(Self { order, product })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    placement_id: Uuid,
    placed_at: DateTime<Utc>,
    payment_intent_id: Option<String>,
}

impl TryFrom<&OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: &OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(i64::from(row.quantity)).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid quantity on item {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name.clone(),
            quantity,
            unit_price: row.unit_price,
        })
    }
}

/// Fold snapshot rows of a single placement into a [`Placement`].
fn placement_from_rows(rows: &[OrderItemRow]) -> Result<Option<Placement>, RepositoryError> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };

    let items = rows
        .iter()
        .map(OrderItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Placement {
        placement_id: first.placement_id,
        placed_at: first.placed_at,
        items,
        payment_intent_id: rows.iter().find_map(|r| r.payment_intent_id.clone()),
    }))
}

const ORDER_COLUMNS: &str = "o.id, o.user_id, o.product_id, o.quantity, o.is_placed, \
                             o.placement_id, o.placed_at, o.payment_intent_id";

/// Repository for cart and order operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    async fn placement_items(
        &self,
        user_id: UserId,
        placement_id: Uuid,
    ) -> Result<Vec<OrderItemRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT i.id, i.order_id, i.product_id, p.name AS product_name,
                   i.quantity, i.unit_price,
                   o.placement_id AS placement_id, o.placed_at AS placed_at,
                   o.payment_intent_id
            FROM storefront.order_items i
            JOIN storefront.orders o ON o.id = i.order_id
            JOIN storefront.products p ON p.id = i.product_id
            WHERE o.user_id = $1 AND o.placement_id = $2
            ORDER BY i.id
            ",
        )
        .bind(user_id)
        .bind(placement_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Lock and return the user's unplaced order IDs inside `tx`.
    async fn lock_cart(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> Result<Vec<i32>, RepositoryError> {
        let ids: Vec<i32> = sqlx::query_scalar(
            r"
            SELECT o.id
            FROM storefront.orders o
            WHERE o.user_id = $1 AND NOT o.is_placed
            ORDER BY o.id
            FOR UPDATE OF o
            ",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(ids)
    }
}

impl OrderStore for OrderRepository<'_> {
    async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.orders AS o (user_id, product_id, quantity)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, product_id) WHERE NOT is_placed
            DO UPDATE SET quantity = LEAST(o.quantity::BIGINT + 1, 2147483647)::INTEGER
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(product_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        row.try_into()
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET quantity = $3
            WHERE user_id = $1 AND product_id = $2 AND NOT is_placed
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity.get())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM storefront.orders
            WHERE user_id = $1 AND product_id = $2 AND NOT is_placed
            ",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cart_items(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS},
                   p.name AS product_name, p.price AS product_price,
                   p.description AS product_description, p.image AS product_image
            FROM storefront.orders o
            JOIN storefront.products p ON p.id = o.product_id
            WHERE o.user_id = $1 AND NOT o.is_placed
            ORDER BY o.id
            "
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    async fn place_cart(&self, user_id: UserId) -> Result<Option<Placement>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_ids = Self::lock_cart(&mut tx, user_id).await?;
        if order_ids.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }

        let placement_id = Uuid::new_v4();
        sqlx::query(
            r"
            UPDATE storefront.orders
            SET is_placed = TRUE, placement_id = $2, placed_at = NOW()
            WHERE id = ANY($1)
            ",
        )
        .bind(&order_ids)
        .bind(placement_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.order_items (order_id, product_id, quantity, unit_price)
            SELECT o.id, o.product_id, o.quantity, p.price
            FROM storefront.orders o
            JOIN storefront.products p ON p.id = o.product_id
            WHERE o.id = ANY($1)
            ORDER BY o.id
            ",
        )
        .bind(&order_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            %placement_id,
            lines = order_ids.len(),
            "Cart placed"
        );

        let rows = self.placement_items(user_id, placement_id).await?;
        placement_from_rows(&rows)
    }

    async fn latest_placement(
        &self,
        user_id: UserId,
    ) -> Result<Option<Placement>, RepositoryError> {
        let placement_id: Option<Uuid> = sqlx::query_scalar(
            r"
            SELECT placement_id
            FROM storefront.orders
            WHERE user_id = $1 AND is_placed AND placement_id IS NOT NULL
            ORDER BY placed_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        let Some(placement_id) = placement_id else {
            return Ok(None);
        };

        let rows = self.placement_items(user_id, placement_id).await?;
        placement_from_rows(&rows)
    }

    async fn attach_payment_intent(
        &self,
        user_id: UserId,
        placement_id: Uuid,
        intent_id: &str,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET payment_intent_id = $3
            WHERE user_id = $1 AND placement_id = $2 AND is_placed
            ",
        )
        .bind(user_id)
        .bind(placement_id)
        .bind(intent_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
