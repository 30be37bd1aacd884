//! HTTP tests against a running storefront.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database with the demo catalog
//!   (`cw-cli migrate && cw-cli seed products`)
//! - The storefront running (`cargo run -p cartwheel-storefront`)
//!
//! Run with: `cargo test -p cartwheel-integration-tests -- --ignored`

#![allow(clippy::unwrap_used)]

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, redirect::Policy};
use serde_json::{Value, json};

use cartwheel_integration_tests::storefront_base_url;
use cartwheel_storefront::services::otp;

/// Client that keeps the session cookie and does not follow redirects, so
/// tests can assert on `Location`.
///
/// Each client claims its own forwarded address so the per-IP auth rate
/// limit does not couple tests together.
fn client() -> Client {
    let octet = unique_suffix() % 250 + 1;
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        HeaderValue::from_str(&format!("198.51.100.{octet}")).unwrap(),
    );

    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

fn location(resp: &reqwest::Response) -> String {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Text between the first `start` and the following `end`.
fn between<'a>(body: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = body.find(start)? + start.len();
    let len = body.get(from..)?.find(end)?;
    body.get(from..from + len)
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

/// Register a fresh user, log in and complete two-factor enrollment.
async fn signed_in_client() -> Client {
    let client = client();
    let base_url = storefront_base_url();
    let suffix = unique_suffix();
    let email = format!("shopper{suffix}@example.com");
    let password = "correct horse battery";

    let resp = client
        .post(format!("{base_url}/register"))
        .form(&[
            ("username", format!("shopper{suffix}").as_str()),
            ("email", email.as_str()),
            ("password", password),
            ("password_confirm", password),
        ])
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(location(&resp), "/login?success=registered");

    let resp = client
        .post(format!("{base_url}/login"))
        .form(&[("email", email.as_str()), ("password", password)])
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(location(&resp), "/two-factor/setup");

    let body = client
        .get(format!("{base_url}/two-factor/setup"))
        .send()
        .await
        .expect("Failed to load enrollment page")
        .text()
        .await
        .unwrap();
    let secret = between(&body, "Enter this key manually: <code>", "</code>")
        .expect("secret on enrollment page")
        .to_string();

    let code = otp::code_at(&secret, otp::unix_now()).unwrap();
    let resp = client
        .post(format!("{base_url}/two-factor"))
        .form(&[("otp", code.as_str())])
        .send()
        .await
        .expect("Failed to verify code");
    assert_eq!(location(&resp), "/?success=verified");

    client
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_health_endpoints() {
    let client = client();
    let base_url = storefront_base_url();

    let resp = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = client
        .get(format!("{base_url}/health/ready"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Auth Guards
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_anonymous_user_is_sent_to_login() {
    let client = client();
    let base_url = storefront_base_url();

    for path in ["/products", "/cart", "/checkout"] {
        let resp = client.get(format!("{base_url}{path}")).send().await.unwrap();
        assert!(resp.status().is_redirection(), "{path}");
        assert_eq!(location(&resp), "/login", "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_api_requires_authentication() {
    let resp = client()
        .post(format!("{}/api/payment-intent", storefront_base_url()))
        .json(&json!({ "amount": 1000 }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_wrong_password_rerenders_login() {
    let resp = client()
        .post(format!("{}/login", storefront_base_url()))
        .form(&[("email", "nobody@example.com"), ("password", "wrong password")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.text().await.unwrap().contains("Invalid email or password"));
}

// ============================================================================
// Cart & Checkout
// ============================================================================

#[tokio::test]
#[ignore = "Requires running, seeded storefront server"]
async fn test_cart_to_checkout() {
    let client = signed_in_client().await;
    let base_url = storefront_base_url();

    // Placing an empty cart goes back to the cart with a message.
    let resp = client
        .post(format!("{base_url}/cart/place-order"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/cart?error=empty_cart");

    let listing = client
        .get(format!("{base_url}/products"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let product_id = between(&listing, "action=\"/cart/add/", "\"")
        .expect("a seeded product")
        .to_string();

    for _ in 0..2 {
        let resp = client
            .post(format!("{base_url}/cart/add/{product_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            location(&resp),
            format!("/products/{product_id}?success=added")
        );
    }

    let cart = client
        .get(format!("{base_url}/cart"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(cart.contains(&format!("name=\"quantity-{product_id}\" value=\"2\"")));

    // A negative quantity is rejected and leaves the cart alone.
    let field = format!("quantity-{product_id}");
    let resp = client
        .post(format!("{base_url}/cart"))
        .form(&[(field.as_str(), "-1")])
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/cart?error=invalid_quantity");

    let resp = client
        .post(format!("{base_url}/cart/place-order"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/checkout?success=placed");

    let checkout = client
        .get(format!("{base_url}/checkout"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let amount: i64 = between(&checkout, "data-amount=\"", "\"")
        .expect("amount on checkout page")
        .parse()
        .unwrap();
    assert!(amount > 0);

    // Missing amount fails before the gateway is contacted.
    let resp = client
        .post(format!("{base_url}/api/payment-intent"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Amount is required");
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_unknown_product_is_not_found() {
    let client = signed_in_client().await;

    let resp = client
        .get(format!("{}/products/999999", storefront_base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
