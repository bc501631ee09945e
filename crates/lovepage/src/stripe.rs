//! Hosted-checkout adapter (Stripe Checkout Sessions).
//!
//! The draft id rides in `client_reference_id`; approval is observed only
//! through the `checkout.session.completed` webhook, never synchronously.

use serde::Deserialize;

use crate::error::LovepageError;
use crate::plan::PlanTier;
use crate::provider::{provider_error, transport_error, ChargeHandle, PaymentAdapter, ProofResult};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

pub struct StripeAdapter {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    /// Origin used for success/cancel URLs when the caller does not
    /// provide one.
    default_return_origin: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

/// A parsed webhook event, reduced to what the finalizer needs.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSession,
}

impl WebhookEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, LovepageError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The completed-and-paid session, if that is what this event carries.
    pub fn completed_session(&self) -> Option<&CheckoutSession> {
        (self.event_type == "checkout.session.completed"
            && self.data.object.payment_status.as_deref() == Some("paid"))
        .then_some(&self.data.object)
    }
}

impl StripeAdapter {
    pub fn new(
        client: reqwest::Client,
        secret_key: impl Into<String>,
        default_return_origin: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            secret_key: secret_key.into(),
            default_return_origin: default_return_origin.into(),
        }
    }

    /// Point the adapter at a different API host (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a checkout session with the draft id embedded as the
    /// reference. Amount and product name come from the plan tier.
    pub async fn create_checkout_session(
        &self,
        draft_id: &str,
        plan: PlanTier,
        return_origin: &str,
    ) -> Result<ChargeHandle, LovepageError> {
        let origin = return_origin.trim_end_matches('/');
        let success_url = format!("{origin}/payment/success?draftId={draft_id}");
        let cancel_url = format!("{origin}/payment/cancel?draftId={draft_id}");
        let amount = plan.price_cents().to_string();
        let params = [
            ("mode", "payment"),
            ("client_reference_id", draft_id),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            (
                "line_items[0][price_data][product_data][name]",
                plan.display_name(),
            ),
        ];

        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| transport_error("stripe", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("stripe", resp).await);
        }
        let session: CheckoutSession =
            resp.json().await.map_err(|e| transport_error("stripe", e))?;

        let mut handle = ChargeHandle::new(session.id);
        handle.redirect_url = session.url;
        Ok(handle)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<CheckoutSession, LovepageError> {
        let resp = self
            .client
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| transport_error("stripe", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("stripe", resp).await);
        }
        resp.json().await.map_err(|e| transport_error("stripe", e))
    }
}

impl PaymentAdapter for StripeAdapter {
    async fn create_charge(
        &self,
        draft_id: &str,
        plan: PlanTier,
    ) -> Result<ChargeHandle, LovepageError> {
        self.create_checkout_session(draft_id, plan, &self.default_return_origin)
            .await
    }

    async fn verify_proof(&self, payment_id: &str) -> Result<ProofResult, LovepageError> {
        let session = self.get_session(payment_id).await?;
        match (session.payment_status.as_deref(), session.client_reference_id) {
            (Some("paid"), Some(draft_id)) => Ok(ProofResult::Approved { draft_id }),
            (Some("unpaid") | None, _) => Ok(ProofResult::Pending),
            (Some(other), _) => Ok(ProofResult::Rejected {
                status: other.to_string(),
            }),
        }
    }
}
