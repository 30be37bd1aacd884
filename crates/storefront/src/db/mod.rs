//! Database operations for the storefront `PostgreSQL` schema.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `users` - Accounts with argon2 password hashes and optional TOTP secrets
//! - `products` - Catalog entries (seeded by `cw-cli seed products`)
//! - `orders` - Cart lines while `is_placed = false`, placed orders afterwards
//! - `order_items` - Price snapshots written at placement
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Store traits
//!
//! Services depend on [`AccountStore`], [`CatalogStore`] and [`OrderStore`]
//! rather than on `PgPool` directly. The `PostgreSQL` repositories implement
//! them for production, [`memory::MemoryStore`] implements all three for tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p cartwheel-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod products;
pub mod users;

use std::future::Future;
use std::time::Duration;

use cartwheel_core::{Email, ProductId, Quantity, UserId, Username};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::{CartItem, Order, Placement};
use crate::models::product::{NewProduct, Product};
use crate::models::user::{NewUser, User};

pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Account persistence.
pub trait AccountStore: Sync {
    /// Insert a new user.
    ///
    /// Fails with `RepositoryError::Conflict("username" | "email")` when the
    /// username or email is already registered; no row is written.
    fn create_user(
        &self,
        user: &NewUser,
    ) -> impl Future<Output = Result<User, RepositoryError>> + Send;

    /// Look up a user by ID.
    fn find_user(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Look up a user by (normalized) email.
    fn find_user_by_email(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Whether a username is already registered.
    fn username_taken(
        &self,
        username: &Username,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Whether an email is already registered.
    fn email_taken(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// The stored password hash for a user.
    fn password_hash(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Replace the user's TOTP secret.
    fn set_otp_secret(
        &self,
        id: UserId,
        secret: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Product catalog persistence.
pub trait CatalogStore: Sync {
    /// All products ordered by ID.
    fn list_products(&self) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;

    /// A single product.
    fn find_product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RepositoryError>> + Send;

    /// Insert a catalog entry.
    fn insert_product(
        &self,
        product: &NewProduct,
    ) -> impl Future<Output = Result<Product, RepositoryError>> + Send;
}

/// Cart and order persistence.
///
/// Every method is scoped to one user. Only unplaced rows are mutated by the
/// cart methods; placed rows change only through [`OrderStore::attach_payment_intent`].
pub trait OrderStore: Sync {
    /// Add one unit of a product to the user's cart.
    ///
    /// Increments the existing unplaced line or creates one with quantity 1,
    /// atomically. The increment saturates at `i32::MAX`. Returns
    /// `RepositoryError::NotFound` for an unknown product.
    fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Order, RepositoryError>> + Send;

    /// Set the quantity of an unplaced line. Returns `false` if there is no such line.
    fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete an unplaced line. Returns `false` if there was nothing to delete.
    fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// The user's unplaced lines with their products, ordered by order ID.
    fn cart_items(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<CartItem>, RepositoryError>> + Send;

    /// Flip every unplaced line to placed in one transaction and snapshot prices.
    ///
    /// Returns `None` when the cart is empty, leaving state untouched.
    fn place_cart(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Placement>, RepositoryError>> + Send;

    /// The most recently placed batch, if any.
    fn latest_placement(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<Placement>, RepositoryError>> + Send;

    /// Record a payment intent on every order of a placement.
    ///
    /// Returns the number of orders updated.
    fn attach_payment_intent(
        &self,
        user_id: UserId,
        placement_id: Uuid,
        intent_id: &str,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique violation to `RepositoryError::Conflict`.
///
/// `constraint_hint` picks a conflict label from the violated constraint's
/// name, falling back to `default` when the driver does not report one.
pub(crate) fn map_unique_violation(
    e: sqlx::Error,
    constraint_hint: &[(&str, &str)],
    default: &str,
) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let label = db_err
            .constraint()
            .and_then(|name| {
                constraint_hint
                    .iter()
                    .find(|(needle, _)| name.contains(needle))
                    .map(|(_, label)| *label)
            })
            .unwrap_or(default);
        return RepositoryError::Conflict(label.to_owned());
    }
    RepositoryError::Database(e)
}
