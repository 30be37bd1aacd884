//! Checkout route handlers.
//!
//! The checkout page prices the most recent placement from its snapshot and
//! hands the amount to Stripe.js, which calls back into
//! `POST /api/payment-intent` for a client secret.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use cartwheel_core::{CurrencyCode, Price};

use crate::db::OrderRepository;
use crate::error::{AppError, JsonError, Result};
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, LineItem, OrderItem};
use crate::routes::MessageQuery;
use crate::services::checkout::{CheckoutService, CheckoutSummary};
use crate::services::payments::PaymentIntent;
use crate::state::AppState;

/// Body of `POST /api/payment-intent`.
#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    /// Amount in minor units (cents).
    pub amount: Option<i64>,
}

/// One placed line for display.
#[derive(Clone)]
pub struct OrderLineView {
    pub name: String,
    pub quantity: i32,
    pub price: String,
    pub line_price: String,
}

impl OrderLineView {
    fn new(item: &OrderItem, currency: CurrencyCode) -> Self {
        Self {
            name: item.product_name.clone(),
            quantity: item.quantity.get(),
            price: Price::new(item.unit_price(), currency).to_string(),
            line_price: Price::new(item.line_total(), currency).to_string(),
        }
    }
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub user: Option<CurrentUser>,
    pub lines: Vec<OrderLineView>,
    pub total: String,
    /// Amount passed to the payment intent endpoint, in minor units.
    pub stripe_total_amount: i64,
    pub stripe_publishable_key: String,
    pub success: Option<String>,
}

/// Payment confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct SuccessTemplate {
    pub user: Option<CurrentUser>,
    pub lines: Vec<OrderLineView>,
    pub total: String,
    pub reference: String,
}

fn line_views(summary: &CheckoutSummary) -> Vec<OrderLineView> {
    summary
        .placement
        .items
        .iter()
        .map(|item| OrderLineView::new(item, summary.total.currency_code))
        .collect()
}

/// Display the payment page for the latest placement.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<MessageQuery>,
) -> Result<Response> {
    let orders = OrderRepository::new(state.pool());
    let stripe = &state.config().stripe;
    let summary = CheckoutService::new(&orders, state.stripe(), stripe.currency)
        .summary(user.id)
        .await?;

    let Some(summary) = summary else {
        return Ok(Redirect::to("/cart?error=nothing_placed").into_response());
    };

    Ok(CheckoutTemplate {
        user: Some(user),
        lines: line_views(&summary),
        total: summary.total.to_string(),
        stripe_total_amount: summary.amount_minor,
        stripe_publishable_key: stripe.publishable_key.clone(),
        success: query.success_message(),
    }
    .into_response())
}

/// Confirmation page shown after Stripe.js completes the payment.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn success(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Response> {
    let orders = OrderRepository::new(state.pool());
    let summary = CheckoutService::new(&orders, state.stripe(), state.config().stripe.currency)
        .summary(user.id)
        .await?;

    let Some(summary) = summary else {
        return Ok(Redirect::to("/").into_response());
    };

    Ok(SuccessTemplate {
        user: Some(user),
        lines: line_views(&summary),
        total: summary.total.to_string(),
        reference: summary
            .placement
            .payment_intent_id
            .clone()
            .unwrap_or_else(|| summary.placement.placement_id.to_string()),
    }
    .into_response())
}

/// Create a payment intent for the posted amount.
///
/// Returns `{"clientSecret": ..., "id": ...}`. Missing amounts, and amounts
/// that differ from the placed total, fail with 400 before the gateway is
/// called; gateway rejections come back as 403 with the provider's message.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    body: std::result::Result<Json<PaymentIntentRequest>, JsonRejection>,
) -> std::result::Result<Json<PaymentIntent>, JsonError> {
    let Json(request) = body.map_err(|e| {
        tracing::debug!(error = %e, "Malformed payment intent request");
        AppError::ValidationFailed("Amount is required".to_string())
    })?;

    let orders = OrderRepository::new(state.pool());
    let intent = CheckoutService::new(&orders, state.stripe(), state.config().stripe.currency)
        .create_payment_intent(user.id, request.amount)
        .await?;

    Ok(Json(intent))
}
