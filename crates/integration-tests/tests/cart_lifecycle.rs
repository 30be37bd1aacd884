//! End-to-end lifecycle through the storefront services.
//!
//! Runs against the in-memory store, so no database or server is needed.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;

use cartwheel_core::{CartState, CurrencyCode};
use cartwheel_integration_tests::{FakeGateway, seeded_store};
use cartwheel_storefront::db::memory::MemoryStore;
use cartwheel_storefront::models::User;
use cartwheel_storefront::services::auth::{AuthError, AuthService, LoginOutcome, Registration};
use cartwheel_storefront::services::cart::{CartError, CartService, calculate_total_amount};
use cartwheel_storefront::services::checkout::{CheckoutError, CheckoutService};
use cartwheel_storefront::services::otp::{self, OtpGuard};
use cartwheel_storefront::services::payments::PaymentError;

const NOW: u64 = 1_700_000_000;

fn registration<'a>(username: &'a str, email: &'a str) -> Registration<'a> {
    Registration {
        username,
        email,
        password: "correct horse battery",
        password_confirm: "correct horse battery",
    }
}

/// Register, log in, enroll and verify a user; returns the user.
async fn signed_in_user(store: &MemoryStore, guard: &OtpGuard) -> User {
    let auth = AuthService::new(store);
    auth.register(registration("shopper", "shopper@example.com"))
        .await
        .expect("register");

    let (user, outcome) = auth
        .login("shopper@example.com", "correct horse battery")
        .await
        .expect("login");
    assert_eq!(outcome, LoginOutcome::EnrollTwoFactor);

    let secret = auth.generate_otp(user.id).await.expect("generate secret");
    let code = otp::code_at(&secret, NOW).expect("code");
    auth.verify_otp_at(user.id, &code, guard, NOW)
        .await
        .expect("verify");

    user
}

#[tokio::test]
async fn test_full_purchase_flow() {
    let (store, basket, shirt) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;

    let cart = CartService::new(&store, &store);
    assert_eq!(cart.cart_state(user.id).await.unwrap(), CartState::Empty);

    // Two adds of the same product collapse into one line.
    cart.add_to_cart(user.id, basket.id).await.unwrap();
    cart.add_to_cart(user.id, basket.id).await.unwrap();
    cart.add_to_cart(user.id, shirt.id).await.unwrap();
    let items = cart.get_cart_items(user.id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].order.quantity.get(), 2);
    assert_eq!(calculate_total_amount(&items), Decimal::new(4000, 2));
    assert_eq!(cart.cart_state(user.id).await.unwrap(), CartState::InCart);

    // The cart form bumps the shirt to 3.
    let quantities = BTreeMap::from([(basket.id, 2), (shirt.id, 3)]);
    cart.update_quantities(user.id, &quantities).await.unwrap();

    let placement = cart.place_order(user.id).await.unwrap();
    assert_eq!(placement.items.len(), 2);
    assert_eq!(placement.total(), Decimal::new(8000, 2));
    assert!(cart.get_cart_items(user.id).await.unwrap().is_empty());
    assert_eq!(cart.cart_state(user.id).await.unwrap(), CartState::Placed);

    let gateway = FakeGateway::default();
    let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);
    let summary = checkout.summary(user.id).await.unwrap().unwrap();
    assert_eq!(summary.amount_minor, 8000);
    assert_eq!(summary.total.to_string(), "$80.00");

    let intent = checkout
        .create_payment_intent(user.id, Some(summary.amount_minor))
        .await
        .unwrap();
    assert_eq!(gateway.calls(), vec![(8000, CurrencyCode::USD)]);

    let placement = cart.latest_placement(user.id).await.unwrap().unwrap();
    assert_eq!(placement.payment_intent_id.as_deref(), Some(intent.id.as_str()));
}

#[tokio::test]
async fn test_new_cart_after_placement_is_a_fresh_batch() {
    let (store, basket, _) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;
    let cart = CartService::new(&store, &store);

    cart.add_to_cart(user.id, basket.id).await.unwrap();
    let first = cart.place_order(user.id).await.unwrap();

    cart.add_to_cart(user.id, basket.id).await.unwrap();
    let items = cart.get_cart_items(user.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].order.quantity.get(), 1);

    let second = cart.place_order(user.id).await.unwrap();
    assert_ne!(first.placement_id, second.placement_id);

    let orders = store.orders().await;
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o.is_placed));
}

#[tokio::test]
async fn test_placement_snapshots_unit_price() {
    let (store, basket, _) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;
    let cart = CartService::new(&store, &store);

    cart.add_to_cart(user.id, basket.id).await.unwrap();
    let placement = cart.place_order(user.id).await.unwrap();

    assert_eq!(placement.items[0].unit_price, Decimal::new(1000, 2));
    assert_eq!(
        cart.latest_placement(user.id).await.unwrap().unwrap().total(),
        Decimal::new(1000, 2)
    );
}

#[tokio::test]
async fn test_empty_cart_cannot_be_placed() {
    let (store, _, _) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;
    let cart = CartService::new(&store, &store);

    let err = cart.place_order(user.id).await.unwrap_err();
    assert!(matches!(err, CartError::EmptyCart));
    assert_eq!(cart.cart_state(user.id).await.unwrap(), CartState::Empty);
    assert!(store.orders().await.is_empty());
}

#[tokio::test]
async fn test_invalid_quantity_rejects_whole_update() {
    let (store, basket, shirt) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;
    let cart = CartService::new(&store, &store);

    cart.add_to_cart(user.id, basket.id).await.unwrap();
    cart.add_to_cart(user.id, shirt.id).await.unwrap();

    let quantities = BTreeMap::from([(basket.id, 0), (shirt.id, -2)]);
    let err = cart.update_quantities(user.id, &quantities).await.unwrap_err();
    assert!(matches!(err, CartError::InvalidQuantity { .. }));

    // Nothing was removed even though the basket entry was valid.
    assert_eq!(cart.get_cart_items(user.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_username_creates_no_user() {
    let store = MemoryStore::new();
    let auth = AuthService::new(&store);

    auth.register(registration("shopper", "first@example.com"))
        .await
        .unwrap();
    let err = auth
        .register(registration("shopper", "second@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UsernameTaken));
    assert_eq!(store.user_count().await, 1);
}

#[tokio::test]
async fn test_returning_user_is_asked_for_code() {
    let (store, _, _) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    signed_in_user(&store, &guard).await;

    let (_, outcome) = AuthService::new(&store)
        .login("shopper@example.com", "correct horse battery")
        .await
        .unwrap();
    assert_eq!(outcome, LoginOutcome::VerifyTwoFactor);
}

#[tokio::test]
async fn test_repeated_bad_codes_lock_the_user_out() {
    let store = MemoryStore::new();
    let auth = AuthService::new(&store);
    let guard = OtpGuard::with_limits(3, Duration::from_secs(300));

    let user = auth
        .register(registration("locked", "locked@example.com"))
        .await
        .unwrap();
    let secret = auth.generate_otp(user.id).await.unwrap();
    let good = otp::code_at(&secret, NOW).unwrap();
    let bad = if good == "000000" { "111111" } else { "000000" };

    for _ in 0..3 {
        let err = auth
            .verify_otp_at(user.id, bad, &guard, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOtp));
    }

    // Even the right code is refused while locked out.
    let err = auth
        .verify_otp_at(user.id, &good, &guard, NOW)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TooManyAttempts));
}

#[tokio::test]
async fn test_missing_amount_never_reaches_gateway() {
    let (store, _, _) = seeded_store().await;
    let gateway = FakeGateway::default();
    let checkout = CheckoutService::new(&store, &gateway, CurrencyCode::USD);
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;

    let err = checkout
        .create_payment_intent(user.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::MissingAmount));

    let err = checkout
        .create_payment_intent(user.id, Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidAmount(0)));

    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_gateway_rejection_carries_provider_message() {
    let (store, basket, _) = seeded_store().await;
    let guard = OtpGuard::with_limits(5, Duration::from_secs(300));
    let user = signed_in_user(&store, &guard).await;
    let cart = CartService::new(&store, &store);
    cart.add_to_cart(user.id, basket.id).await.unwrap();
    cart.place_order(user.id).await.unwrap();

    let gateway = FakeGateway::rejecting("Your card was declined.");
    let err = CheckoutService::new(&store, &gateway, CurrencyCode::USD)
        .create_payment_intent(user.id, Some(1000))
        .await
        .unwrap_err();

    match err {
        CheckoutError::Payment(PaymentError::Gateway(message)) => {
            assert_eq!(message, "Your card was declined.");
        }
        other => panic!("expected gateway error, got {other:?}"),
    }

    let placement = cart.latest_placement(user.id).await.unwrap().unwrap();
    assert_eq!(placement.payment_intent_id, None);
}
