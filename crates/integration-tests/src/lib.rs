//! Integration tests for Cartwheel.
//!
//! # Running Tests
//!
//! ```bash
//! # Service-level lifecycle tests (no database needed)
//! cargo test -p cartwheel-integration-tests
//!
//! # Live HTTP tests against a running, migrated and seeded storefront
//! cw-cli migrate && cw-cli seed products
//! cargo run -p cartwheel-storefront &
//! cargo test -p cartwheel-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `cart_lifecycle` - register, two-factor, cart, placement and checkout
//!   through the services over the in-memory store
//! - `storefront_http` - the same flow over HTTP (`#[ignore]`d)

use std::sync::Mutex;

use rust_decimal::Decimal;

use cartwheel_core::CurrencyCode;
use cartwheel_storefront::db::CatalogStore;
use cartwheel_storefront::db::memory::MemoryStore;
use cartwheel_storefront::models::{NewProduct, Product};
use cartwheel_storefront::services::payments::{PaymentError, PaymentGateway, PaymentIntent};

/// Base URL for the live storefront (configurable via environment).
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A store holding the demo catalog: a $10.00 and a $20.00 product.
///
/// # Panics
///
/// Panics if the in-memory insert fails, which it does not.
pub async fn seeded_store() -> (MemoryStore, Product, Product) {
    let store = MemoryStore::new();
    let basket = store
        .insert_product(&NewProduct {
            name: "The Essentials Basket".to_string(),
            price: Decimal::new(1000, 2),
            description: String::new(),
            image: String::new(),
        })
        .await
        .expect("insert basket");
    let shirt = store
        .insert_product(&NewProduct {
            name: "The Classic Buttoned Shirt".to_string(),
            price: Decimal::new(2000, 2),
            description: String::new(),
            image: String::new(),
        })
        .await
        .expect("insert shirt");
    (store, basket, shirt)
}

/// Payment gateway double that records every call.
///
/// Succeeds with a predictable intent unless built with [`FakeGateway::rejecting`].
#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<Vec<(i64, CurrencyCode)>>,
    reject_with: Option<String>,
}

impl FakeGateway {
    /// A gateway that refuses every intent with `message`.
    #[must_use]
    pub fn rejecting(message: &str) -> Self {
        Self {
            calls: Mutex::default(),
            reject_with: Some(message.to_string()),
        }
    }

    /// Every `(amount, currency)` the gateway was asked to charge.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<(i64, CurrencyCode)> {
        self.calls.lock().expect("gateway lock").clone()
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, PaymentError> {
        let call_number = {
            let mut calls = self.calls.lock().expect("gateway lock");
            calls.push((amount_minor, currency));
            calls.len()
        };

        match &self.reject_with {
            Some(message) => Err(PaymentError::Gateway(message.clone())),
            None => Ok(PaymentIntent {
                id: format!("pi_test_{call_number}"),
                client_secret: format!("pi_test_{call_number}_secret"),
            }),
        }
    }
}
