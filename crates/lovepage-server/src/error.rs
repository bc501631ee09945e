use actix_web::{HttpResponse, ResponseError};
use lovepage::LovepageError;

/// Wrapper mapping core errors to HTTP responses.
///
/// Webhook handlers do NOT go through this — they answer 200 for every
/// handled outcome and reserve 401/500 for the documented cases.
#[derive(Debug)]
pub struct ApiError(pub LovepageError);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<LovepageError> for ApiError {
    fn from(e: LovepageError) -> Self {
        Self(e)
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match &self.0 {
            LovepageError::Config(name) => {
                tracing::error!(missing = %name, "request failed on missing configuration");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "server_configuration",
                    "message": "The server is not configured for this operation"
                }))
            }
            LovepageError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_request",
                "message": msg
            })),
            LovepageError::Unauthorized => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication failed"
            })),
            LovepageError::Provider { code, detail } => {
                tracing::warn!(code = %code, detail = %detail, "provider call failed");
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "provider_error",
                    "code": code,
                    "message": "The payment provider could not process the request"
                }))
            }
            LovepageError::DraftNotFound(id) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "draft_not_found",
                "message": format!("Draft '{id}' not found")
            })),
            LovepageError::ObjectNotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "not_found"
            })),
            LovepageError::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
            LovepageError::Finalize { stage, cause } => {
                tracing::error!(stage = %stage, cause = %cause, "finalize failure");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "finalize_failed",
                    "message": "Page creation failed; the operation is safe to retry"
                }))
            }
            LovepageError::Serde(e) => {
                tracing::error!(error = %e, "serialization failure");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}
