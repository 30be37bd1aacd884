//! Core types for Cartwheel.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod account;
pub mod id;
pub mod price;
pub mod quantity;
pub mod state;

pub use account::{Email, EmailError, Username, UsernameError};
pub use id::*;
pub use price::{CurrencyCode, CurrencyCodeError, Price};
pub use quantity::{Quantity, QuantityError};
pub use state::CartState;
