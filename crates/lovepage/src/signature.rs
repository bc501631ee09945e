//! Webhook signature verification.
//!
//! Two schemes are in play, one per asynchronous provider:
//!
//! - the QR/polling provider signs a manifest derived from the notification
//!   (`x-signature: ts=<ts>,v1=<hex>` + `x-request-id`);
//! - the hosted-checkout provider signs the raw payload
//!   (`t=<ts>,v1=<hmac(ts + "." + body)>`).
//!
//! Rejections never tell the caller which check failed — the specific
//! reason goes to the log and the caller sees a generic
//! [`LovepageError::Unauthorized`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::LovepageError;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the message. Returns the hex-encoded MAC.
pub fn compute_hmac(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded HMAC-SHA256 signature in constant time.
///
/// Invalid hex is compared against zeros so it fails without a timing
/// side-channel.
pub fn verify_hmac(secret: &[u8], message: &[u8], signature: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    let expected = hex::decode(signature).unwrap_or_else(|_| vec![0u8; 32]);
    mac.verify_slice(&expected).is_ok()
}

/// A parsed `ts=…,v1=…` (or `t=…,v1=…`) signature header.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    ts: String,
    v1: String,
}

fn parse_signature_header(header: &str, ts_key: &str) -> Option<SignatureHeader> {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key.trim() {
            k if k == ts_key => ts = Some(value.trim().to_string()),
            "v1" => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Some(SignatureHeader { ts: ts?, v1: v1? })
}

/// Outcome of a verified QR-provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedNotification {
    /// The provider's payment id, extracted from `data.id`.
    pub payment_id: String,
}

/// Authenticate an asynchronous payment notification from the QR/polling
/// provider.
///
/// Manifest: `id:<dataId>;request-id:<requestId>;ts:<ts>;` — HMAC-SHA256
/// over it with the server-held secret must match the `v1` hash from the
/// signature header.
pub fn verify_notification(
    secret: &[u8],
    raw_body: &[u8],
    signature_header: Option<&str>,
    request_id: Option<&str>,
) -> Result<VerifiedNotification, LovepageError> {
    if secret.is_empty() {
        return Err(LovepageError::Config("webhook secret"));
    }
    let Some(header) = signature_header else {
        tracing::warn!("notification rejected: missing signature header");
        return Err(LovepageError::Unauthorized);
    };
    let Some(request_id) = request_id else {
        tracing::warn!("notification rejected: missing request id header");
        return Err(LovepageError::Unauthorized);
    };
    let Some(sig) = parse_signature_header(header, "ts") else {
        tracing::warn!("notification rejected: malformed signature header");
        return Err(LovepageError::Unauthorized);
    };

    let body: serde_json::Value = match serde_json::from_slice(raw_body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "notification rejected: unparseable body");
            return Err(LovepageError::Unauthorized);
        }
    };
    // data.id may arrive as a string or a bare number.
    let payment_id = match &body["data"]["id"] {
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => {
            tracing::warn!("notification rejected: missing data.id");
            return Err(LovepageError::Unauthorized);
        }
    };

    let manifest = format!("id:{};request-id:{};ts:{};", payment_id, request_id, sig.ts);
    if !verify_hmac(secret, manifest.as_bytes(), &sig.v1) {
        tracing::warn!(payment_id = %payment_id, "notification rejected: signature mismatch");
        return Err(LovepageError::Unauthorized);
    }

    Ok(VerifiedNotification { payment_id })
}

/// Authenticate a signed-payload webhook from the hosted-checkout provider
/// (`t=<ts>,v1=<hmac(ts + "." + body)>`).
pub fn verify_signed_payload(
    secret: &[u8],
    raw_body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), LovepageError> {
    if secret.is_empty() {
        return Err(LovepageError::Config("checkout webhook secret"));
    }
    let Some(header) = signature_header else {
        tracing::warn!("checkout webhook rejected: missing signature header");
        return Err(LovepageError::Unauthorized);
    };
    let Some(sig) = parse_signature_header(header, "t") else {
        tracing::warn!("checkout webhook rejected: malformed signature header");
        return Err(LovepageError::Unauthorized);
    };

    let mut signed = Vec::with_capacity(sig.ts.len() + 1 + raw_body.len());
    signed.extend_from_slice(sig.ts.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(raw_body);

    if !verify_hmac(secret, &signed, &sig.v1) {
        tracing::warn!("checkout webhook rejected: signature mismatch");
        return Err(LovepageError::Unauthorized);
    }
    Ok(())
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 || !s.is_ascii() {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"s3cr3t";

    fn signed_header(ts: &str, manifest: &str) -> String {
        format!("ts={},v1={}", ts, compute_hmac(SECRET, manifest.as_bytes()))
    }

    #[test]
    fn accepts_correct_manifest_signature() {
        let body = br#"{"action":"payment.updated","data":{"id":"123"}}"#;
        let header = signed_header("1700000000", "id:123;request-id:req-1;ts:1700000000;");

        let verified =
            verify_notification(SECRET, body, Some(&header), Some("req-1")).unwrap();
        assert_eq!(verified.payment_id, "123");
    }

    #[test]
    fn accepts_numeric_data_id() {
        let body = br#"{"data":{"id":123}}"#;
        let header = signed_header("1700000000", "id:123;request-id:req-1;ts:1700000000;");

        let verified =
            verify_notification(SECRET, body, Some(&header), Some("req-1")).unwrap();
        assert_eq!(verified.payment_id, "123");
    }

    #[test]
    fn rejects_wrong_hash() {
        let body = br#"{"data":{"id":"123"}}"#;
        let header = format!("ts=1700000000,v1={}", "ab".repeat(32));
        let err = verify_notification(SECRET, body, Some(&header), Some("req-1")).unwrap_err();
        assert!(matches!(err, LovepageError::Unauthorized));
    }

    #[test]
    fn rejects_missing_headers_and_body_problems() {
        let body = br#"{"data":{"id":"123"}}"#;
        let header = signed_header("1700000000", "id:123;request-id:req-1;ts:1700000000;");

        assert!(matches!(
            verify_notification(SECRET, body, None, Some("req-1")),
            Err(LovepageError::Unauthorized)
        ));
        assert!(matches!(
            verify_notification(SECRET, body, Some(&header), None),
            Err(LovepageError::Unauthorized)
        ));
        assert!(matches!(
            verify_notification(SECRET, b"not json", Some(&header), Some("req-1")),
            Err(LovepageError::Unauthorized)
        ));
        assert!(matches!(
            verify_notification(SECRET, br#"{"data":{}}"#, Some(&header), Some("req-1")),
            Err(LovepageError::Unauthorized)
        ));
    }

    #[test]
    fn missing_secret_is_a_config_error_not_unauthorized() {
        let err = verify_notification(b"", b"{}", Some("ts=1,v1=00"), Some("r")).unwrap_err();
        assert!(matches!(err, LovepageError::Config(_)));
    }

    #[test]
    fn signed_payload_roundtrip_and_tamper() {
        let body = br#"{"type":"checkout.session.completed"}"#;
        let mut signed = b"1700000000.".to_vec();
        signed.extend_from_slice(body);
        let header = format!("t=1700000000,v1={}", compute_hmac(SECRET, &signed));

        assert!(verify_signed_payload(SECRET, body, Some(&header)).is_ok());
        assert!(matches!(
            verify_signed_payload(SECRET, br#"{"type":"tampered"}"#, Some(&header)),
            Err(LovepageError::Unauthorized)
        ));
    }

    #[test]
    fn header_parser_tolerates_whitespace() {
        let parsed = parse_signature_header(" ts=1 , v1=ab ", "ts").unwrap();
        assert_eq!(parsed.ts, "1");
        assert_eq!(parsed.v1, "ab");
    }

    #[test]
    fn hmac_rejects_invalid_hex_without_panicking() {
        assert!(!verify_hmac(SECRET, b"body", "not-hex-zz"));
    }
}
