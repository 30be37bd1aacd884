//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page
//! GET  /health                 - Health check
//! GET  /health/ready           - Readiness check (database ping)
//!
//! # Auth
//! GET  /register               - Registration page
//! POST /register               - Registration action
//! GET  /login                  - Login page
//! POST /login                  - Login action (password step)
//! POST /logout                 - Logout action
//!
//! # Two-factor (password login required)
//! GET  /two-factor             - Code entry page
//! POST /two-factor             - Verify code, completes sign-in
//! GET  /two-factor/setup       - Enrollment page (new secret + QR code)
//!
//! # Products (requires auth)
//! GET  /products               - Product listing
//! GET  /products/{id}          - Product detail
//!
//! # Cart (requires auth)
//! GET  /cart                   - Cart page
//! POST /cart                   - Update quantities (`quantity-{id}` fields)
//! POST /cart/add/{id}          - Add one unit of a product
//! POST /cart/remove/{id}       - Remove a line
//! POST /cart/place-order       - Place every cart line
//!
//! # Checkout (requires auth)
//! GET  /checkout               - Payment page for the latest placement
//! GET  /checkout/success       - Confirmation page
//! POST /api/payment-intent     - Create a payment intent (JSON)
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod home;
pub mod products;
pub mod two_factor;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

// =============================================================================
// Flash-style Messages
// =============================================================================

/// Query parameters carrying a message code after a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

impl MessageQuery {
    /// Resolve the error code to a display message; unknown codes are dropped.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_deref().and_then(message_for).map(String::from)
    }

    /// Resolve the success code to a display message; unknown codes are dropped.
    #[must_use]
    pub fn success_message(&self) -> Option<String> {
        self.success.as_deref().and_then(message_for).map(String::from)
    }
}

/// Map a redirect message code to its text.
fn message_for(code: &str) -> Option<&'static str> {
    Some(match code {
        "registered" => "Congratulations, you are now a registered user!",
        "logged_out" => "You have been signed out",
        "verified" => "OTP verified successfully",
        "added" => "Product added to cart",
        "cart_updated" => "Cart updated",
        "removed" => "Item removed from cart!",
        "placed" => "Order placed successfully",
        "empty_cart" => "Your cart is empty",
        "invalid_quantity" => "Quantities must be zero or a positive number",
        "nothing_placed" => "There is no placed order to pay for",
        "session" => "Your session could not be saved, please try again",
        _ => return None,
    })
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
///
/// Password and code submissions are IP rate limited on top of the per-user
/// OTP lockout.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route(
            "/two-factor",
            get(two_factor::verify_page).post(two_factor::verify),
        )
        .route("/two-factor/setup", get(two_factor::setup_page))
        .layer(auth_rate_limiter())
        .route("/logout", post(auth::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::update))
        .route("/add/{id}", post(cart::add))
        .route("/remove/{id}", post(cart::remove))
        .route("/place-order", post(cart::place_order))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/success", get(checkout::success))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/payment-intent", post(checkout::create_payment_intent))
        .layer(api_rate_limiter())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(auth_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/api", api_routes())
}

// =============================================================================
// Health
// =============================================================================

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_resolve() {
        let query = MessageQuery {
            error: Some("empty_cart".to_string()),
            success: Some("added".to_string()),
        };
        assert_eq!(query.error_message().as_deref(), Some("Your cart is empty"));
        assert_eq!(
            query.success_message().as_deref(),
            Some("Product added to cart")
        );
    }

    #[test]
    fn test_unknown_codes_are_dropped() {
        let query = MessageQuery {
            error: Some("<script>".to_string()),
            success: None,
        };
        assert_eq!(query.error_message(), None);
        assert_eq!(query.success_message(), None);
    }
}
