//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::services::otp::OtpGuard;
use crate::services::payments::{PaymentError, StripeClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Repositories borrow the pool
/// per request rather than being stored here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    stripe: StripeClient,
    otp_guard: OtpGuard,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the payment client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, PaymentError> {
        let stripe = StripeClient::new(&config.stripe)?;
        let otp_guard = OtpGuard::new(&config.otp);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stripe,
                otp_guard,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the payment gateway client.
    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    /// Get a reference to the failed-OTP counter.
    #[must_use]
    pub fn otp_guard(&self) -> &OtpGuard {
        &self.inner.otp_guard
    }
}
