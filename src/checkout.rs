//! Payment checkout sessions.
//!
//! [`CheckoutProvider`] is the seam to the external payment service. The
//! production implementation talks to a Stripe-compatible HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("checkout provider is not configured")]
    NotConfigured,
    #[error("checkout provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("checkout provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("checkout session {0} has no redirect url")]
    MissingUrl(String),
}

/// One-item order for a checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOrder {
    /// Caller reference stored on the session (the buyer's user id).
    pub client_reference_id: String,
    pub product_name: String,
    /// Price in minor units (cents).
    pub unit_amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(&self, order: &CheckoutOrder) -> Result<CheckoutSession, CheckoutError>;
}

/// Convert a display price such as `"$29"` or `" 12.50 "` to minor units.
///
/// The amount is multiplied by 100 and truncated, so binary rounding can lose
/// a cent (`"19.99"` gives 1998). Anything unparsable yields 0.
pub fn parse_price_to_minor_units(price: &str) -> i64 {
    let trimmed = price.trim();
    let cleaned = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();

    match cleaned.parse::<f64>() {
        Ok(amount) if amount.is_finite() => (amount * 100.0) as i64,
        _ => {
            warn!(price, "failed to parse price, defaulting to 0");
            0
        }
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorResponse {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Stripe Checkout client (`POST /v1/checkout/sessions`).
pub struct StripeCheckout {
    client: reqwest::Client,
    secret_key: Option<String>,
    api_base: String,
    frontend_url: String,
}

impl StripeCheckout {
    pub fn new(secret_key: Option<String>, api_base: &str, frontend_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    fn form(&self, order: &CheckoutOrder) -> Vec<(&'static str, String)> {
        vec![
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price_data][currency]", order.currency.clone()),
            (
                "line_items[0][price_data][product_data][name]",
                order.product_name.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                order.unit_amount.to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("mode", "payment".to_string()),
            (
                "success_url",
                format!("{}/dashboard?payment=success", self.frontend_url),
            ),
            (
                "cancel_url",
                format!("{}/products?payment=cancelled", self.frontend_url),
            ),
            ("client_reference_id", order.client_reference_id.clone()),
        ]
    }
}

#[async_trait]
impl CheckoutProvider for StripeCheckout {
    #[instrument(skip(self, order), fields(product = %order.product_name, user_id = %order.client_reference_id))]
    async fn create_session(&self, order: &CheckoutOrder) -> Result<CheckoutSession, CheckoutError> {
        let secret_key = self.secret_key.as_deref().ok_or(CheckoutError::NotConfigured)?;

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(secret_key)
            .form(&self.form(order))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(CheckoutError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let session: SessionResponse = response.json().await?;
        let url = session
            .url
            .ok_or_else(|| CheckoutError::MissingUrl(session.id.clone()))?;
        info!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession { id: session.id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Form, Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price_to_minor_units("$29"), 2900);
        assert_eq!(parse_price_to_minor_units(" $ 12.5 "), 1250);
        assert_eq!(parse_price_to_minor_units("7"), 700);
        // Truncation, not rounding.
        assert_eq!(parse_price_to_minor_units("19.99"), 1998);
        assert_eq!(parse_price_to_minor_units("free"), 0);
        assert_eq!(parse_price_to_minor_units(""), 0);
        assert_eq!(parse_price_to_minor_units("$inf"), 0);
    }

    fn order() -> CheckoutOrder {
        CheckoutOrder {
            client_reference_id: "user-1".into(),
            product_name: "Pro Plan".into(),
            unit_amount: 2900,
            currency: "usd".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let stripe = StripeCheckout::new(None, "http://127.0.0.1:9", "http://app.test");
        let err = stripe.create_session(&order()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotConfigured));
    }

    async fn fake_provider() -> String {
        async fn sessions(
            headers: HeaderMap,
            Form(form): Form<HashMap<String, String>>,
        ) -> (axum::http::StatusCode, Json<serde_json::Value>) {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer sk_test");
            if !authorized {
                return (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": {"message": "Invalid API Key"}})),
                );
            }
            let url = format!(
                "https://pay.test/{}/{}?ref={}&ok={}",
                form["line_items[0][price_data][product_data][name]"],
                form["line_items[0][price_data][unit_amount]"],
                form["client_reference_id"],
                form["success_url"],
            );
            (
                axum::http::StatusCode::OK,
                Json(serde_json::json!({"id": "cs_test_1", "url": url})),
            )
        }

        let app = Router::new().route("/v1/checkout/sessions", post(sessions));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_session_created_against_provider() {
        let base = fake_provider().await;
        let stripe = StripeCheckout::new(Some("sk_test".into()), &base, "http://app.test/");

        let session = stripe.create_session(&order()).await.unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(
            session.url,
            "https://pay.test/Pro Plan/2900?ref=user-1&ok=http://app.test/dashboard?payment=success"
        );
    }

    #[tokio::test]
    async fn test_provider_rejection_is_surfaced() {
        let base = fake_provider().await;
        let stripe = StripeCheckout::new(Some("sk_wrong".into()), &base, "http://app.test");

        let err = stripe.create_session(&order()).await.unwrap_err();
        match err {
            CheckoutError::Provider { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API Key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
