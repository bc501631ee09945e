use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};

use lovepage::draft_store::{Draft, DraftStatus};
use lovepage::finalize::FinalizeOutcome;
use lovepage::plan::PlanTier;
use lovepage::provider::{PaymentAdapter, ProofResult};
use lovepage::signature;
use lovepage::stripe::WebhookEvent;
use lovepage::LovepageError;

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

/// Register every route. Shared by the binary and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(metrics_endpoint)
        .service(autosave)
        .service(create_checkout_session)
        .service(create_order)
        .service(capture_order)
        .service(create_pix_charge)
        .service(payment_status)
        .service(pix_webhook)
        .service(stripe_webhook)
        .service(paypal_webhook)
        .service(admin_finalize)
        .service(get_page)
        .service(list_pages);
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Finalize with outcome metrics. Every trigger funnels through here.
fn run_finalize(
    state: &AppState,
    draft_id: &str,
    payment_id: &str,
) -> Result<FinalizeOutcome, LovepageError> {
    let start = std::time::Instant::now();
    let result = state.finalizer.finalize(draft_id, payment_id);
    let label = match &result {
        Ok(outcome) if outcome.newly_completed => "won",
        Ok(_) => "converged",
        Err(_) => "error",
    };
    metrics::FINALIZE_TOTAL.with_label_values(&[label]).inc();
    metrics::FINALIZE_LATENCY
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    result
}

/// A charge can only be opened against an existing, still-pending draft.
fn pending_draft(state: &AppState, draft_id: &str) -> Result<Draft, LovepageError> {
    let draft = state
        .drafts
        .get(draft_id)?
        .ok_or_else(|| LovepageError::DraftNotFound(draft_id.to_string()))?;
    if draft.status == DraftStatus::Completed {
        return Err(LovepageError::Validation(
            "draft is already finalized".to_string(),
        ));
    }
    Ok(draft)
}

fn track_provider<T>(provider: &str, result: &Result<T, LovepageError>) {
    let label = if result.is_ok() { "ok" } else { "error" };
    metrics::PROVIDER_REQUESTS
        .with_label_values(&[provider, label])
        .inc();
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "lovepage-server",
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = header(&req, "authorization")
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| lovepage::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);
            if !authorized {
                return HttpResponse::Unauthorized().json(json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None => {
            return HttpResponse::Forbidden().json(json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN to access /metrics"
            }));
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveRequest {
    pub draft_id: Option<String>,
    pub owner_id: String,
    pub content: Value,
}

#[post("/drafts")]
pub async fn autosave(
    state: web::Data<AppState>,
    body: web::Json<AutosaveRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.owner_id.is_empty() {
        return Err(LovepageError::Validation("ownerId is required".to_string()).into());
    }
    let draft = state
        .drafts
        .save_content(body.draft_id.as_deref(), &body.owner_id, &body.content)?;
    Ok(HttpResponse::Ok().json(json!({ "draftId": draft.id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    pub draft_id: String,
    pub plan: PlanTier,
    pub return_origin: Option<String>,
}

#[post("/checkout/sessions")]
pub async fn create_checkout_session(
    state: web::Data<AppState>,
    body: web::Json<CheckoutSessionRequest>,
) -> Result<HttpResponse, ApiError> {
    pending_draft(&state, &body.draft_id)?;

    let result = match &body.return_origin {
        Some(origin) => {
            url::Url::parse(origin).map_err(|_| {
                LovepageError::Validation(format!("invalid return origin: {origin}"))
            })?;
            state
                .stripe
                .create_checkout_session(&body.draft_id, body.plan, origin)
                .await
        }
        None => state.stripe.create_charge(&body.draft_id, body.plan).await,
    };
    track_provider("stripe", &result);
    let handle = result?;

    state.drafts.set_payment_id(&body.draft_id, &handle.payment_id)?;
    Ok(HttpResponse::Ok().json(json!({
        "sessionId": handle.payment_id,
        "url": handle.redirect_url,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub draft_id: String,
    pub plan: PlanTier,
}

#[post("/orders")]
pub async fn create_order(
    state: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    pending_draft(&state, &body.draft_id)?;

    let result = state.paypal.create_order(&body.draft_id, body.plan).await;
    track_provider("paypal", &result);
    let order_id = result?;

    state.drafts.set_payment_id(&body.draft_id, &order_id)?;
    Ok(HttpResponse::Ok().json(json!({ "orderId": order_id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderRequest {
    pub draft_id: String,
}

#[post("/orders/{order_id}/capture")]
pub async fn capture_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CaptureOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let order_id = path.into_inner();
    let result = state.paypal.capture_order(&order_id).await;
    track_provider("paypal", &result);

    match result {
        Ok(outcome) if outcome.completed => {
            // The provider's reference is authoritative; the body's draft id
            // is only a fallback for legacy clients.
            let draft_id = outcome.draft_id.unwrap_or_else(|| body.draft_id.clone());
            let finalized = run_finalize(&state, &draft_id, &order_id)?;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "pageId": finalized.page_id,
            })))
        }
        Ok(_) => Ok(HttpResponse::Ok().json(json!({
            "success": false,
            "error": "payment was not completed",
        }))),
        // Capture failures degrade to an inline message the client can show.
        Err(LovepageError::Provider { code, .. }) => Ok(HttpResponse::Ok().json(json!({
            "success": false,
            "error": format!("payment could not be captured ({code})"),
        }))),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixChargeRequest {
    pub draft_id: String,
    pub plan: PlanTier,
}

#[post("/charges/pix")]
pub async fn create_pix_charge(
    state: web::Data<AppState>,
    body: web::Json<PixChargeRequest>,
) -> Result<HttpResponse, ApiError> {
    pending_draft(&state, &body.draft_id)?;

    let result = state.pix.create_charge(&body.draft_id, body.plan).await;
    track_provider("pix", &result);
    let handle = result?;

    state.drafts.set_payment_id(&body.draft_id, &handle.payment_id)?;
    Ok(HttpResponse::Ok().json(json!({
        "paymentId": handle.payment_id,
        "qrCode": handle.qr_code,
        "qrCodeImage": handle.qr_code_image,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub payment_id: String,
    pub draft_id: String,
}

/// Synchronous status check driven by the client poll loop.
///
/// Always 200 with one of `{approved}`, `{pending}`, `{error}` — a failed
/// provider call is a transient condition the client polls through, not an
/// HTTP error.
#[post("/payments/status")]
pub async fn payment_status(
    state: web::Data<AppState>,
    body: web::Json<StatusRequest>,
) -> HttpResponse {
    let result = state.pix.verify_proof(&body.payment_id).await;
    track_provider("pix", &result);

    match result {
        Ok(ProofResult::Approved { draft_id }) => {
            if draft_id != body.draft_id {
                tracing::warn!(
                    provider_ref = %draft_id,
                    client_ref = %body.draft_id,
                    "draft reference mismatch, trusting the provider"
                );
            }
            match run_finalize(&state, &draft_id, &body.payment_id) {
                Ok(outcome) => HttpResponse::Ok().json(json!({ "approved": outcome.page_id })),
                Err(e) => {
                    tracing::error!(error = %e, "finalize failed on poll path");
                    HttpResponse::Ok().json(json!({ "error": "page creation failed, retrying" }))
                }
            }
        }
        Ok(ProofResult::Pending) => HttpResponse::Ok().json(json!({ "pending": true })),
        Ok(ProofResult::Rejected { status }) => {
            HttpResponse::Ok().json(json!({ "error": format!("payment {status}") }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "status check failed");
            HttpResponse::Ok().json(json!({ "error": "status check failed" }))
        }
    }
}

/// Asynchronous notification from the QR provider. The raw body is
/// required for signature computation — never pre-parsed.
#[post("/webhooks/pix")]
pub async fn pix_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let verified = match signature::verify_notification(
        &state.pix_webhook_secret,
        &body,
        header(&req, "x-signature"),
        header(&req, "x-request-id"),
    ) {
        Ok(v) => v,
        Err(LovepageError::Config(name)) => {
            tracing::error!(missing = name, "webhook rejected: server misconfigured");
            return HttpResponse::InternalServerError().json(json!({
                "error": "server_configuration"
            }));
        }
        Err(_) => {
            metrics::SIGNATURE_FAILURES.with_label_values(&["pix"]).inc();
            return HttpResponse::Unauthorized().json(json!({
                "error": "authentication failed"
            }));
        }
    };

    let result = state.pix.verify_proof(&verified.payment_id).await;
    track_provider("pix", &result);

    match result {
        Ok(ProofResult::Approved { draft_id }) => {
            match run_finalize(&state, &draft_id, &verified.payment_id) {
                Ok(outcome) => HttpResponse::Ok().json(json!({
                    "status": "processed",
                    "pageId": outcome.page_id,
                })),
                Err(e) => {
                    // Still 2xx: the redundant triggers (poll, retry) will
                    // finish the job; a non-2xx makes the provider hammer
                    // the endpoint or disable it.
                    tracing::error!(error = %e, "finalize failed on webhook path");
                    HttpResponse::Ok().json(json!({ "status": "deferred" }))
                }
            }
        }
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ignored" })),
        Err(e) => {
            tracing::warn!(error = %e, "webhook status lookup failed");
            HttpResponse::Ok().json(json!({ "status": "deferred" }))
        }
    }
}

/// Asynchronous notification from the hosted-checkout provider.
#[post("/webhooks/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    match signature::verify_signed_payload(
        &state.stripe_webhook_secret,
        &body,
        header(&req, "stripe-signature"),
    ) {
        Ok(()) => {}
        Err(LovepageError::Config(name)) => {
            tracing::error!(missing = name, "webhook rejected: server misconfigured");
            return HttpResponse::InternalServerError().json(json!({
                "error": "server_configuration"
            }));
        }
        Err(_) => {
            metrics::SIGNATURE_FAILURES
                .with_label_values(&["stripe"])
                .inc();
            return HttpResponse::Unauthorized().json(json!({
                "error": "authentication failed"
            }));
        }
    }

    let event = match WebhookEvent::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable checkout event, ignoring");
            return HttpResponse::Ok().json(json!({ "status": "ignored" }));
        }
    };

    let Some(session) = event.completed_session() else {
        return HttpResponse::Ok().json(json!({ "status": "ignored" }));
    };
    let Some(draft_id) = session.client_reference_id.as_deref() else {
        tracing::warn!(session = %session.id, "completed session without draft reference");
        return HttpResponse::Ok().json(json!({ "status": "ignored" }));
    };

    match run_finalize(&state, draft_id, &session.id) {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "status": "processed",
            "pageId": outcome.page_id,
        })),
        Err(e) => {
            tracing::error!(error = %e, "finalize failed on webhook path");
            HttpResponse::Ok().json(json!({ "status": "deferred" }))
        }
    }
}

/// The order/capture provider requires a configured webhook endpoint even
/// though the synchronous capture response is the proof. Always 200.
#[post("/webhooks/paypal")]
pub async fn paypal_webhook() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "received": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminFinalizeRequest {
    pub draft_id: String,
}

/// Operator override to manually unblock a stuck draft.
#[post("/admin/finalize")]
pub async fn admin_finalize(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<AdminFinalizeRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = header(&req, "x-user-id")
        .filter(|id| !id.is_empty())
        .ok_or(LovepageError::Unauthorized)?;

    let start = std::time::Instant::now();
    let result = state.finalizer.finalize_as_operator(caller, &body.draft_id);
    let label = match &result {
        Ok(outcome) if outcome.newly_completed => "won",
        Ok(_) => "converged",
        Err(_) => "error",
    };
    metrics::FINALIZE_TOTAL.with_label_values(&[label]).inc();
    metrics::FINALIZE_LATENCY
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());

    let outcome = result?;
    Ok(HttpResponse::Ok().json(json!({
        "pageId": outcome.page_id,
        "newlyCompleted": outcome.newly_completed,
    })))
}

#[get("/pages/{page_id}")]
pub async fn get_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let page_id = path.into_inner();
    let Some(page) = state.pages.get(&page_id)? else {
        return Ok(HttpResponse::NotFound().json(json!({
            "error": "page_not_found"
        })));
    };
    if page.is_expired(chrono::Utc::now().timestamp()) {
        return Ok(HttpResponse::Gone().json(json!({
            "error": "page_expired"
        })));
    }
    Ok(HttpResponse::Ok().json(json!({
        "id": page.id,
        "content": page.content,
        "createdAt": page.created_at,
        "expireAt": page.expire_at,
    })))
}

#[get("/users/{user_id}/pages")]
pub async fn list_pages(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let summaries = state.pages.list_by_owner(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({ "pages": summaries })))
}
