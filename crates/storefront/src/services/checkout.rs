//! Checkout: pricing the placed batch and creating payment intents.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use cartwheel_core::{CurrencyCode, Price, UserId};

use crate::db::{OrderStore, RepositoryError};
use crate::models::order::Placement;
use crate::services::payments::{PaymentError, PaymentGateway, PaymentIntent};

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No amount was supplied.
    #[error("amount is required")]
    MissingAmount,

    /// The amount was zero or negative.
    #[error("amount must be a positive integer in minor units (got {0})")]
    InvalidAmount(i64),

    /// There is no placed batch to pay for.
    #[error("no placed order to pay for")]
    NothingPlaced,

    /// The posted amount differs from the placement's snapshot total.
    #[error("amount {got} does not match the order total {expected}")]
    AmountMismatch { expected: i64, got: i64 },

    /// The total does not fit in minor units.
    #[error("order total {0} cannot be charged")]
    TotalOutOfRange(Decimal),

    /// The payment gateway failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What the checkout page needs to start a payment.
#[derive(Debug, Clone)]
pub struct CheckoutSummary {
    pub placement: Placement,
    pub total: Price,
    /// Total in the currency's minor units, as sent to the gateway.
    pub amount_minor: i64,
}

/// Checkout operations for a single request.
pub struct CheckoutService<'a, O, G> {
    orders: &'a O,
    gateway: &'a G,
    currency: CurrencyCode,
}

impl<'a, O: OrderStore, G: PaymentGateway> CheckoutService<'a, O, G> {
    /// Create a checkout service.
    #[must_use]
    pub const fn new(orders: &'a O, gateway: &'a G, currency: CurrencyCode) -> Self {
        Self {
            orders,
            gateway,
            currency,
        }
    }

    /// Summary of the user's latest placement, or `None` if nothing was placed.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::TotalOutOfRange` if the snapshot total cannot be
    /// expressed in minor units.
    pub async fn summary(&self, user_id: UserId) -> Result<Option<CheckoutSummary>, CheckoutError> {
        let Some(placement) = self.orders.latest_placement(user_id).await? else {
            return Ok(None);
        };

        let total = Price::new(placement.total(), self.currency);
        let amount_minor = total
            .to_minor_units()
            .ok_or(CheckoutError::TotalOutOfRange(total.amount))?;

        Ok(Some(CheckoutSummary {
            placement,
            total,
            amount_minor,
        }))
    }

    /// Create a payment intent for `amount` minor units.
    ///
    /// The amount is validated before the gateway is contacted and must equal
    /// the snapshot total of the user's latest placement. On success the
    /// intent is recorded on that placement.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingAmount` / `InvalidAmount` for bad input,
    /// `NothingPlaced` / `AmountMismatch` when the amount does not pay for a
    /// placement, and `CheckoutError::Payment` when the gateway fails.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        user_id: UserId,
        amount: Option<i64>,
    ) -> Result<PaymentIntent, CheckoutError> {
        let amount = amount.ok_or(CheckoutError::MissingAmount)?;
        if amount <= 0 {
            return Err(CheckoutError::InvalidAmount(amount));
        }

        let summary = self
            .summary(user_id)
            .await?
            .ok_or(CheckoutError::NothingPlaced)?;
        if amount != summary.amount_minor {
            return Err(CheckoutError::AmountMismatch {
                expected: summary.amount_minor,
                got: amount,
            });
        }

        let intent = self.gateway.create_intent(amount, self.currency).await?;

        let placement_id = summary.placement.placement_id;
        let updated = self
            .orders
            .attach_payment_intent(user_id, placement_id, &intent.id)
            .await?;
        tracing::info!(
            intent_id = %intent.id,
            placement_id = %placement_id,
            orders = updated,
            "Payment intent attached"
        );

        Ok(intent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::db::CatalogStore;
    use crate::db::memory::MemoryStore;
    use crate::models::product::NewProduct;
    use crate::services::cart::CartService;

    /// Records calls and returns a canned result.
    #[derive(Default)]
    struct MockGateway {
        calls: Mutex<Vec<(i64, CurrencyCode)>>,
        fail_with: Option<String>,
    }

    impl PaymentGateway for MockGateway {
        async fn create_intent(
            &self,
            amount_minor: i64,
            currency: CurrencyCode,
        ) -> Result<PaymentIntent, PaymentError> {
            self.calls.lock().unwrap().push((amount_minor, currency));
            if let Some(message) = &self.fail_with {
                return Err(PaymentError::Gateway(message.clone()));
            }
            Ok(PaymentIntent {
                id: "pi_test_123".to_owned(),
                client_secret: "pi_test_123_secret_abc".to_owned(),
            })
        }
    }

    const USER: UserId = UserId::new(7);

    async fn placed_store() -> MemoryStore {
        let store = MemoryStore::new();
        let product = store
            .insert_product(&NewProduct {
                name: "Basket".to_owned(),
                price: Decimal::new(1000, 2),
                description: String::new(),
                image: String::new(),
            })
            .await
            .unwrap();
        let cart = CartService::new(&store, &store);
        cart.add_to_cart(USER, product.id).await.unwrap();
        cart.add_to_cart(USER, product.id).await.unwrap();
        cart.place_order(USER).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_amount_never_reaches_gateway() {
        let store = MemoryStore::new();
        let gateway = MockGateway::default();
        let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);

        let err = checkout.create_payment_intent(USER, None).await.unwrap_err();
        assert!(matches!(err, CheckoutError::MissingAmount));
        let err = checkout.create_payment_intent(USER, Some(0)).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidAmount(0)));

        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_intent_attached_to_latest_placement() {
        let store = placed_store().await;
        let gateway = MockGateway::default();
        let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);

        let intent = checkout
            .create_payment_intent(USER, Some(2000))
            .await
            .unwrap();
        assert_eq!(intent.id, "pi_test_123");
        assert_eq!(*gateway.calls.lock().unwrap(), vec![(2000, CurrencyCode::USD)]);

        let summary = checkout.summary(USER).await.unwrap().unwrap();
        assert_eq!(summary.placement.payment_intent_id.as_deref(), Some("pi_test_123"));
    }

    #[tokio::test]
    async fn test_amount_must_match_placement_total() {
        let store = placed_store().await;
        let gateway = MockGateway::default();
        let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);

        let err = checkout
            .create_payment_intent(USER, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::AmountMismatch {
                expected: 2000,
                got: 1
            }
        ));
        assert!(gateway.calls.lock().unwrap().is_empty());

        let summary = checkout.summary(USER).await.unwrap().unwrap();
        assert!(summary.placement.payment_intent_id.is_none());
    }

    #[tokio::test]
    async fn test_intent_requires_a_placement() {
        let store = MemoryStore::new();
        let gateway = MockGateway::default();
        let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);

        let err = checkout
            .create_payment_intent(USER, Some(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NothingPlaced));
        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_error_carries_provider_message() {
        let store = placed_store().await;
        let gateway = MockGateway {
            fail_with: Some("Your card was declined.".to_owned()),
            ..MockGateway::default()
        };
        let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);

        let err = checkout
            .create_payment_intent(USER, Some(2000))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Your card was declined.");

        let summary = checkout.summary(USER).await.unwrap().unwrap();
        assert!(summary.placement.payment_intent_id.is_none());
    }

    #[tokio::test]
    async fn test_summary_uses_snapshot_total() {
        let store = placed_store().await;
        let gateway = MockGateway::default();
        let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);

        let summary = checkout.summary(USER).await.unwrap().unwrap();
        assert_eq!(summary.total.to_string(), "$20.00");
        assert_eq!(summary.amount_minor, 2000);

        assert!(checkout.summary(UserId::new(8)).await.unwrap().is_none());
    }
}
