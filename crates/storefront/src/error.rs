//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. HTML route handlers return `Result<T, AppError>`;
//! JSON endpoints wrap it in [`JsonError`] to get a `{"error": ...}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::checkout::CheckoutError;
use crate::services::payments::PaymentError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User input was rejected.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Credentials or one-time code were wrong, or login is required.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Placement attempted with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The payment gateway rejected the request.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) | Self::EmptyCart => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::Gateway(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    ///
    /// Internal details are never exposed; gateway messages are passed through
    /// because they are written for end users.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("{what} not found"),
            Self::ValidationFailed(msg) | Self::AuthenticationFailed(msg) | Self::Gateway(msg) => {
                msg.clone()
            }
            Self::EmptyCart => "Your cart is empty".to_string(),
            Self::RateLimited => "Too many requests, please slow down".to_string(),
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Session(_) | Self::Internal(_)
        )
    }

    /// Capture server errors to Sentry.
    fn report(&self) {
        if self.is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if matches!(self, Self::Gateway(_)) {
            tracing::warn!(error = %self, "Payment gateway error");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();
        (self.status(), self.public_message()).into_response()
    }
}

/// `AppError` rendered as a JSON body: `{"error": "..."}`.
#[derive(Debug)]
pub struct JsonError(pub AppError);

impl From<AppError> for JsonError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<CheckoutError> for JsonError {
    fn from(err: CheckoutError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        self.0.report();
        let body = serde_json::json!({ "error": self.0.public_message() });
        (self.0.status(), Json(body)).into_response()
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ProductNotFound(_) => Self::NotFound("Product".to_string()),
            CartError::InvalidQuantity { .. } => {
                Self::ValidationFailed("Quantities must be zero or a positive number".to_string())
            }
            CartError::EmptyCart => Self::EmptyCart,
            CartError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidEmail(_) => Self::ValidationFailed("Invalid email address".to_string()),
            AuthError::InvalidUsername(e) => Self::ValidationFailed(capitalize(&e.to_string())),
            AuthError::UsernameTaken => {
                Self::ValidationFailed("Please use a different username.".to_string())
            }
            AuthError::EmailTaken => {
                Self::ValidationFailed("Please use a different email address.".to_string())
            }
            AuthError::PasswordMismatch => {
                Self::ValidationFailed("Passwords do not match".to_string())
            }
            AuthError::WeakPassword(msg) => Self::ValidationFailed(capitalize(&msg)),
            AuthError::InvalidCredentials | AuthError::AccountDisabled => {
                Self::AuthenticationFailed("Invalid email or password".to_string())
            }
            AuthError::UserNotFound => {
                Self::AuthenticationFailed("Please sign in again".to_string())
            }
            AuthError::InvalidOtp => Self::AuthenticationFailed("Incorrect OTP".to_string()),
            AuthError::TwoFactorNotEnrolled => {
                Self::AuthenticationFailed("Two-factor authentication is not set up".to_string())
            }
            AuthError::TooManyAttempts => Self::RateLimited,
            AuthError::Repository(e) => Self::Database(e),
            AuthError::Otp(e) => Self::Internal(e.to_string()),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::MissingAmount => Self::ValidationFailed("Amount is required".to_string()),
            CheckoutError::InvalidAmount(_) => {
                Self::ValidationFailed("Amount must be a positive integer".to_string())
            }
            CheckoutError::NothingPlaced => {
                Self::ValidationFailed("There is no placed order to pay for".to_string())
            }
            CheckoutError::AmountMismatch { .. } => {
                Self::ValidationFailed("Amount does not match the order total".to_string())
            }
            CheckoutError::TotalOutOfRange(_) => {
                Self::ValidationFailed("Order total cannot be charged".to_string())
            }
            CheckoutError::Payment(e) => e.into(),
            CheckoutError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Gateway(msg) => Self::Gateway(msg),
            PaymentError::Http(e) => {
                tracing::warn!(error = %e, "Payment gateway unreachable");
                Self::Gateway("Payment service unavailable".to_string())
            }
            PaymentError::InvalidResponse(e) => Self::Internal(e),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Session(err.to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
