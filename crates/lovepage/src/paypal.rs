//! Client-initiated order/capture adapter (PayPal Orders v2).
//!
//! Order creation is server-side with the draft id in `custom_id`; the
//! client invokes capture after user approval and the synchronous capture
//! response is the proof of payment. No webhook is required on this path,
//! but the server still exposes a no-op endpoint to satisfy provider
//! configuration requirements.

use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::LovepageError;
use crate::plan::PlanTier;
use crate::provider::{provider_error, transport_error, ChargeHandle, PaymentAdapter, ProofResult};

const DEFAULT_BASE_URL: &str = "https://api-m.paypal.com";

/// Renew the cached OAuth token this long before the provider's expiry.
const TOKEN_RENEWAL_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct PaypalAdapter {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    payments: Option<UnitPayments>,
}

#[derive(Debug, Deserialize)]
struct UnitPayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    custom_id: Option<String>,
}

/// Result of a synchronous capture call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub completed: bool,
    pub draft_id: Option<String>,
}

impl PaypalAdapter {
    pub fn new(
        client: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    /// Point the adapter at a different API host (sandbox, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn cached_token(&self) -> Result<Option<String>, LovepageError> {
        let guard = self
            .token
            .lock()
            .map_err(|_| LovepageError::Storage("token cache lock poisoned".to_string()))?;
        Ok(guard
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.access_token.clone()))
    }

    async fn access_token(&self) -> Result<String, LovepageError> {
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }

        let resp = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("paypal", resp).await);
        }
        let token: TokenResponse = resp.json().await.map_err(|e| transport_error("paypal", e))?;

        let expires_at = Instant::now()
            + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_RENEWAL_MARGIN);
        let mut guard = self
            .token
            .lock()
            .map_err(|_| LovepageError::Storage("token cache lock poisoned".to_string()))?;
        *guard = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    /// Create an order with the draft id in `custom_id`. Returns the
    /// provider order id the client needs for approval and capture.
    pub async fn create_order(
        &self,
        draft_id: &str,
        plan: PlanTier,
    ) -> Result<String, LovepageError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": draft_id,
                "description": plan.display_name(),
                "amount": {
                    "currency_code": "USD",
                    "value": plan.price_decimal(),
                },
            }],
        });

        let resp = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("paypal", resp).await);
        }
        let order: OrderResponse = resp.json().await.map_err(|e| transport_error("paypal", e))?;
        Ok(order.id)
    }

    /// Capture a client-approved order. The synchronous `COMPLETED`
    /// response is the proof of payment.
    pub async fn capture_order(&self, order_id: &str) -> Result<CaptureOutcome, LovepageError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{}/v2/checkout/orders/{order_id}/capture", self.base_url))
            .bearer_auth(token)
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("paypal", resp).await);
        }
        let order: OrderResponse = resp.json().await.map_err(|e| transport_error("paypal", e))?;
        Ok(capture_outcome(&order))
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResponse, LovepageError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(format!("{}/v2/checkout/orders/{order_id}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error("paypal", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("paypal", resp).await);
        }
        resp.json().await.map_err(|e| transport_error("paypal", e))
    }
}

fn capture_outcome(order: &OrderResponse) -> CaptureOutcome {
    let completed = order.status.as_deref() == Some("COMPLETED");
    let draft_id = order.purchase_units.first().and_then(|unit| {
        unit.payments
            .as_ref()
            .and_then(|p| p.captures.first())
            .and_then(|c| c.custom_id.clone())
            .or_else(|| unit.custom_id.clone())
    });
    CaptureOutcome {
        completed,
        draft_id,
    }
}

impl PaymentAdapter for PaypalAdapter {
    async fn create_charge(
        &self,
        draft_id: &str,
        plan: PlanTier,
    ) -> Result<ChargeHandle, LovepageError> {
        let order_id = self.create_order(draft_id, plan).await?;
        Ok(ChargeHandle::new(order_id))
    }

    async fn verify_proof(&self, payment_id: &str) -> Result<ProofResult, LovepageError> {
        let order = self.get_order(payment_id).await?;
        let outcome = capture_outcome(&order);
        match (outcome.completed, outcome.draft_id) {
            (true, Some(draft_id)) => Ok(ProofResult::Approved { draft_id }),
            (true, None) => Err(LovepageError::Validation(
                "completed order carries no draft reference".to_string(),
            )),
            (false, _) => match order.status.as_deref() {
                Some("CREATED") | Some("APPROVED") | Some("SAVED") | None => {
                    Ok(ProofResult::Pending)
                }
                Some(other) => Ok(ProofResult::Rejected {
                    status: other.to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_outcome_prefers_capture_custom_id() {
        let order: OrderResponse = serde_json::from_value(json!({
            "id": "ORD-1",
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": {"captures": [{"status": "COMPLETED", "custom_id": "D1"}]},
            }],
        }))
        .unwrap();
        let outcome = capture_outcome(&order);
        assert!(outcome.completed);
        assert_eq!(outcome.draft_id.as_deref(), Some("D1"));
    }

    #[test]
    fn capture_outcome_falls_back_to_unit_custom_id() {
        let order: OrderResponse = serde_json::from_value(json!({
            "id": "ORD-1",
            "status": "CREATED",
            "purchase_units": [{"custom_id": "D1"}],
        }))
        .unwrap();
        let outcome = capture_outcome(&order);
        assert!(!outcome.completed);
        assert_eq!(outcome.draft_id.as_deref(), Some("D1"));
    }
}
