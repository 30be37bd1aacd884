//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, password login and TOTP two-factor
//! - `cart` - Cart lines, placement and totals
//! - `checkout` - Checkout summary and payment intents
//! - `otp` - RFC 6238 primitives and the failed-attempt guard
//! - `payments` - Payment gateway trait and the Stripe client
//!
//! Services borrow their stores per request and are generic over the store
//! traits in [`crate::db`], so tests run them against the in-memory store.

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod otp;
pub mod payments;
