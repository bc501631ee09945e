//! QR-proof-of-payment adapter (Mercado Pago Pix).
//!
//! A charge is created synchronously with the draft id in
//! `external_reference` and returns a scannable code. The client polls the
//! status endpoint until the provider reports approval; the signed webhook
//! (see [`crate::signature`]) is the redundant, faster trigger. Both paths
//! call the same finalizer.

use serde::Deserialize;
use serde_json::json;

use crate::error::LovepageError;
use crate::plan::PlanTier;
use crate::provider::{provider_error, transport_error, ChargeHandle, PaymentAdapter, ProofResult};

const DEFAULT_BASE_URL: &str = "https://api.mercadopago.com";

pub struct PixAdapter {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: serde_json::Number,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    external_reference: Option<String>,
    #[serde(default)]
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    #[serde(default)]
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    qr_code_base64: Option<String>,
}

impl PixAdapter {
    pub fn new(client: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Point the adapter at a different API host (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl PaymentAdapter for PixAdapter {
    async fn create_charge(
        &self,
        draft_id: &str,
        plan: PlanTier,
    ) -> Result<ChargeHandle, LovepageError> {
        let body = json!({
            "transaction_amount": f64::from(plan.price_cents()) / 100.0,
            "description": plan.display_name(),
            "payment_method_id": "pix",
            "external_reference": draft_id,
        });

        let resp = self
            .client
            .post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(&self.access_token)
            // Provider-side replay guard: a retried create must not open a
            // second charge.
            .header("X-Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("pix", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("pix", resp).await);
        }
        let payment: PaymentResponse = resp.json().await.map_err(|e| transport_error("pix", e))?;

        let mut handle = ChargeHandle::new(payment.id.to_string());
        if let Some(data) = payment
            .point_of_interaction
            .and_then(|poi| poi.transaction_data)
        {
            handle.qr_code = data.qr_code;
            handle.qr_code_image = data.qr_code_base64;
        }
        Ok(handle)
    }

    async fn verify_proof(&self, payment_id: &str) -> Result<ProofResult, LovepageError> {
        let resp = self
            .client
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport_error("pix", e))?;
        if !resp.status().is_success() {
            return Err(provider_error("pix", resp).await);
        }
        let payment: PaymentResponse = resp.json().await.map_err(|e| transport_error("pix", e))?;

        match payment.status.as_deref() {
            Some("approved") | Some("authorized") => match payment.external_reference {
                Some(draft_id) if !draft_id.is_empty() => Ok(ProofResult::Approved { draft_id }),
                _ => Err(LovepageError::Validation(
                    "approved payment carries no draft reference".to_string(),
                )),
            },
            Some("pending") | Some("in_process") | None => Ok(ProofResult::Pending),
            Some(other) => Ok(ProofResult::Rejected {
                status: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_response_reads_qr_payloads() {
        let payment: PaymentResponse = serde_json::from_value(json!({
            "id": 12345,
            "status": "pending",
            "external_reference": "D1",
            "point_of_interaction": {
                "transaction_data": {
                    "qr_code": "00020126pix",
                    "qr_code_base64": "aW1n",
                }
            }
        }))
        .unwrap();
        assert_eq!(payment.id.to_string(), "12345");
        let data = payment
            .point_of_interaction
            .unwrap()
            .transaction_data
            .unwrap();
        assert_eq!(data.qr_code.as_deref(), Some("00020126pix"));
        assert_eq!(data.qr_code_base64.as_deref(), Some("aW1n"));
    }

    #[test]
    fn payment_response_tolerates_missing_fields() {
        let payment: PaymentResponse = serde_json::from_value(json!({"id": 1})).unwrap();
        assert!(payment.status.is_none());
        assert!(payment.point_of_interaction.is_none());
    }
}
