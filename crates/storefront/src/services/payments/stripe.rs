//! Stripe payment intents client.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use cartwheel_core::CurrencyCode;

use super::{PaymentError, PaymentGateway, PaymentIntent};
use crate::config::StripeConfig;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the secret key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value)
            .map_err(|e| PaymentError::InvalidResponse(format!("invalid API key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert("Authorization", auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
        })
    }
}

impl PaymentGateway for StripeClient {
    #[tracing::instrument(skip(self), fields(gateway = "stripe"))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, PaymentError> {
        let url = format!("{}/v1/payment_intents", self.api_base);
        let amount = amount_minor.to_string();
        let form = [("amount", amount.as_str()), ("currency", currency.gateway_code())];

        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = gateway_message(&body)
                .unwrap_or_else(|| format!("payment gateway returned {status}"));
            tracing::warn!(status = status.as_u16(), %message, "Payment intent rejected");
            return Err(PaymentError::Gateway(message));
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;

        tracing::info!(intent_id = %intent.id, amount_minor, "Payment intent created");

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}

/// Extract the provider's message from an error body.
fn gateway_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    envelope.error.message.or(envelope.error.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_message_prefers_message() {
        let body = r#"{"error":{"message":"Amount must be at least 50 cents","type":"invalid_request_error"}}"#;
        assert_eq!(
            gateway_message(body).as_deref(),
            Some("Amount must be at least 50 cents")
        );
    }

    #[test]
    fn test_gateway_message_falls_back_to_type() {
        let body = r#"{"error":{"type":"api_error"}}"#;
        assert_eq!(gateway_message(body).as_deref(), Some("api_error"));
        assert_eq!(gateway_message("<html>"), None);
    }
}
