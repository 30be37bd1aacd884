//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`].

pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use order::{CartItem, LineItem, Order, OrderItem, Placement};
pub use product::{NewProduct, Product};
pub use session::CurrentUser;
pub use user::{NewUser, User};
