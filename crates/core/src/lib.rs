//! Cartwheel Core - Shared domain types.
//!
//! This crate provides the types shared by every Cartwheel component:
//! - `storefront` - Public-facing shop (catalog, cart, checkout)
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Database encodings are behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, account identity, money, quantities and cart state

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
