//! Core trait for the three payment integrations.
//!
//! Each provider threads the draft id through its own reference field
//! (`client_reference_id` / `custom_id` / `external_reference`); behind
//! this trait the finalizer and the routes see one shape.
//!
//! - [`crate::stripe::StripeAdapter`] — hosted-checkout redirect
//! - [`crate::paypal::PaypalAdapter`] — client-initiated order/capture
//! - [`crate::pix::PixAdapter`] — server-generated QR with polling

use serde::{Deserialize, Serialize};

use crate::error::LovepageError;
use crate::plan::PlanTier;

/// What a provider hands back when a charge is created. Fields beyond
/// `payment_id` depend on the integration: a redirect URL for hosted
/// checkout, QR payloads for the polling provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeHandle {
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_image: Option<String>,
}

impl ChargeHandle {
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            redirect_url: None,
            qr_code: None,
            qr_code_image: None,
        }
    }
}

/// Provider-reported state of a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofResult {
    /// The charge is approved; `draft_id` comes from the provider's
    /// out-of-band reference field.
    Approved { draft_id: String },
    /// Not approved yet — a normal, non-error condition for polling.
    Pending,
    /// Terminally not approved (cancelled, refused, expired).
    Rejected { status: String },
}

/// One payment integration.
pub trait PaymentAdapter: Send + Sync {
    /// Create a charge for the draft. Amounts are resolved server-side
    /// from the plan tier — never from client input.
    fn create_charge(
        &self,
        draft_id: &str,
        plan: PlanTier,
    ) -> impl std::future::Future<Output = Result<ChargeHandle, LovepageError>> + Send;

    /// Ask the provider for the payment's current state.
    fn verify_proof(
        &self,
        payment_id: &str,
    ) -> impl std::future::Future<Output = Result<ProofResult, LovepageError>> + Send;
}

/// Longest provider response slice carried in an error detail.
const MAX_ERROR_DETAIL: usize = 512;

/// Map a non-success provider response to a typed error carrying the
/// status code and a bounded slice of the raw body for diagnostics.
pub(crate) async fn provider_error(provider: &str, resp: reqwest::Response) -> LovepageError {
    let status = resp.status();
    let mut body = resp.text().await.unwrap_or_default();
    body.truncate(MAX_ERROR_DETAIL);
    tracing::warn!(provider, status = %status, body = %body, "provider call failed");
    LovepageError::provider(status.as_str(), format!("{provider}: {body}"))
}

/// Map a transport-level failure (connect, timeout, decode).
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> LovepageError {
    tracing::warn!(provider, error = %e, "provider request failed");
    LovepageError::provider("transport", format!("{provider}: {e}"))
}
