//! Payment gateway abstraction.
//!
//! [`PaymentGateway`] is the seam between checkout and the hosted payment
//! API. [`stripe::StripeClient`] is the production implementation.

pub mod stripe;

use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use cartwheel_core::CurrencyCode;

pub use stripe::StripeClient;

/// Errors returned by a payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway rejected the request. Carries the provider's message.
    #[error("{0}")]
    Gateway(String),

    /// HTTP transport failed before the gateway answered.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a body we could not read.
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// A created payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    /// Gateway identifier (`pi_...`).
    pub id: String,
    /// Secret the browser uses to confirm the payment.
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

/// A hosted payment API able to create payment intents.
pub trait PaymentGateway: Sync {
    /// Create a payment intent for `amount_minor` units of `currency`.
    fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> impl Future<Output = Result<PaymentIntent, PaymentError>> + Send;
}
