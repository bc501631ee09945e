use actix_web::{test, web, App};
use std::sync::Arc;

use lovepage::draft_store::{DraftStore, InMemoryDraftStore};
use lovepage::finalize::Finalizer;
use lovepage::object_store::{InMemoryObjectStore, ObjectStore};
use lovepage::page_store::{InMemoryPageStore, PageStore, PermanentPage};
use lovepage::paypal::PaypalAdapter;
use lovepage::pix::PixAdapter;
use lovepage::profile::InMemoryProfileStore;
use lovepage::signature;
use lovepage::stripe::StripeAdapter;

use lovepage_server::routes;
use lovepage_server::state::AppState;

const PIX_SECRET: &[u8] = b"pix-webhook-secret";
const STRIPE_SECRET: &[u8] = b"stripe-webhook-secret";

struct TestWorld {
    state: web::Data<AppState>,
    drafts: Arc<InMemoryDraftStore>,
    pages: Arc<InMemoryPageStore>,
    objects: Arc<InMemoryObjectStore>,
    profiles: Arc<InMemoryProfileStore>,
}

/// Build an AppState over in-memory stores, with every provider adapter
/// pointed at an unroutable address so no call leaves the process.
fn make_world(pix_secret: &[u8], stripe_secret: &[u8]) -> TestWorld {
    let drafts = Arc::new(InMemoryDraftStore::new());
    let pages = Arc::new(InMemoryPageStore::new());
    let objects = Arc::new(InMemoryObjectStore::new("https://cdn.test"));
    let profiles = Arc::new(InMemoryProfileStore::new());

    let dyn_drafts: Arc<dyn DraftStore> = drafts.clone();
    let dyn_pages: Arc<dyn PageStore> = pages.clone();
    let dyn_objects: Arc<dyn ObjectStore> = objects.clone();

    let finalizer = Finalizer::new(
        dyn_drafts.clone(),
        dyn_pages.clone(),
        dyn_objects,
        profiles.clone(),
    );

    let client = reqwest::Client::new();
    let state = web::Data::new(AppState {
        drafts: dyn_drafts,
        pages: dyn_pages,
        finalizer,
        stripe: StripeAdapter::new(client.clone(), "sk_test", "http://localhost:3000")
            .with_base_url("http://localhost:1"),
        paypal: PaypalAdapter::new(client.clone(), "client-id", "client-secret")
            .with_base_url("http://localhost:1"),
        pix: PixAdapter::new(client, "mp-token").with_base_url("http://localhost:1"),
        pix_webhook_secret: pix_secret.to_vec(),
        stripe_webhook_secret: stripe_secret.to_vec(),
        metrics_token: None,
    });

    TestWorld {
        state,
        drafts,
        pages,
        objects,
        profiles,
    }
}

macro_rules! init_app {
    ($world:expr) => {
        test::init_service(
            App::new()
                .app_data($world.state.clone())
                .app_data(web::JsonConfig::default().limit(262_144))
                .configure(routes::configure),
        )
        .await
    };
}

fn pix_signature(secret: &[u8], data_id: &str, request_id: &str, ts: &str) -> String {
    let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
    format!(
        "ts={ts},v1={}",
        signature::compute_hmac(secret, manifest.as_bytes())
    )
}

fn stripe_signature(secret: &[u8], body: &[u8], ts: &str) -> String {
    let mut signed = ts.as_bytes().to_vec();
    signed.push(b'.');
    signed.extend_from_slice(body);
    format!("t={ts},v1={}", signature::compute_hmac(secret, &signed))
}

#[actix_rt::test]
async fn health_is_open() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn autosave_creates_and_merges_drafts() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::post()
        .uri("/drafts")
        .set_json(serde_json::json!({
            "ownerId": "u1",
            "content": {"title": "Us", "theme": "stars"},
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let draft_id = body["draftId"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/drafts")
        .set_json(serde_json::json!({
            "draftId": draft_id,
            "ownerId": "u1",
            "content": {"title": "Still us"},
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let draft = world.drafts.get(&draft_id).unwrap().unwrap();
    assert_eq!(draft.content["title"], serde_json::json!("Still us"));
    assert_eq!(draft.content["theme"], serde_json::json!("stars"));
}

#[actix_rt::test]
async fn pix_webhook_requires_signature() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    // Missing headers entirely.
    let req = test::TestRequest::post()
        .uri("/webhooks/pix")
        .set_payload(r#"{"data":{"id":"123"}}"#)
        .insert_header(("content-type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // Wrong hash.
    let req = test::TestRequest::post()
        .uri("/webhooks/pix")
        .set_payload(r#"{"data":{"id":"123"}}"#)
        .insert_header(("content-type", "application/json"))
        .insert_header(("x-signature", "ts=1700000000,v1=deadbeef"))
        .insert_header(("x-request-id", "req-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication failed");
}

#[actix_rt::test]
async fn pix_webhook_missing_secret_is_a_server_error() {
    let world = make_world(b"", STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::post()
        .uri("/webhooks/pix")
        .set_payload(r#"{"data":{"id":"123"}}"#)
        .insert_header(("content-type", "application/json"))
        .insert_header(("x-signature", "ts=1700000000,v1=00"))
        .insert_header(("x-request-id", "req-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
}

#[actix_rt::test]
async fn pix_webhook_with_valid_signature_defers_when_provider_unreachable() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let body = r#"{"action":"payment.updated","data":{"id":"123"}}"#;
    let req = test::TestRequest::post()
        .uri("/webhooks/pix")
        .set_payload(body)
        .insert_header(("content-type", "application/json"))
        .insert_header((
            "x-signature",
            pix_signature(PIX_SECRET, "123", "req-1", "1700000000"),
        ))
        .insert_header(("x-request-id", "req-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    // Authenticated, but the status lookup cannot reach the provider:
    // still a 2xx so the provider does not retry-storm.
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "deferred");
}

#[actix_rt::test]
async fn stripe_webhook_finalizes_a_paid_draft() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    world.objects.put("temp/u1/gallery/1700-a.jpg", b"img");
    let draft = world
        .drafts
        .save_content(
            None,
            "u1",
            &serde_json::json!({
                "title": "Us",
                "plan": "basic",
                "gallery": [{"url": "https://cdn.test/tmp", "path": "temp/u1/gallery/1700-a.jpg"}],
            }),
        )
        .unwrap();

    let event = serde_json::json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": "cs_1",
            "client_reference_id": draft.id,
            "payment_status": "paid",
        }},
    })
    .to_string();

    let req = test::TestRequest::post()
        .uri("/webhooks/stripe")
        .set_payload(event.clone())
        .insert_header(("content-type", "application/json"))
        .insert_header((
            "stripe-signature",
            stripe_signature(STRIPE_SECRET, event.as_bytes(), "1700000000"),
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "processed");
    let page_id = body["pageId"].as_str().unwrap().to_string();

    // The gallery image was promoted and the draft completed.
    let page = world.pages.get(&page_id).unwrap().unwrap();
    assert_eq!(
        page.content["gallery"][0]["path"],
        serde_json::json!(format!("perm/{page_id}/gallery/1700-a.jpg"))
    );
    assert!(page.expire_at.is_some());

    // Redelivery of the same event is an already-processed 200.
    let req = test::TestRequest::post()
        .uri("/webhooks/stripe")
        .set_payload(event.clone())
        .insert_header(("content-type", "application/json"))
        .insert_header((
            "stripe-signature",
            stripe_signature(STRIPE_SECRET, event.as_bytes(), "1700000000"),
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["pageId"], serde_json::json!(page_id));
}

#[actix_rt::test]
async fn stripe_webhook_rejects_tampered_payload() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let event = r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
    let sig = stripe_signature(STRIPE_SECRET, event.as_bytes(), "1700000000");

    let req = test::TestRequest::post()
        .uri("/webhooks/stripe")
        .set_payload(r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_2"}}}"#)
        .insert_header(("content-type", "application/json"))
        .insert_header(("stripe-signature", sig))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_rt::test]
async fn paypal_webhook_is_a_no_op() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::post()
        .uri("/webhooks/paypal")
        .set_payload("{}")
        .insert_header(("content-type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn status_check_surfaces_transient_failure_as_error_shape() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::post()
        .uri("/payments/status")
        .set_json(serde_json::json!({"paymentId": "123", "draftId": "D1"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body.get("error").is_some());
    assert!(body.get("approved").is_none());
}

#[actix_rt::test]
async fn checkout_session_requires_an_existing_pending_draft() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::post()
        .uri("/checkout/sessions")
        .set_json(serde_json::json!({"draftId": "missing", "plan": "basic"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_rt::test]
async fn admin_finalize_is_operator_only() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let draft = world
        .drafts
        .save_content(None, "u1", &serde_json::json!({"title": "Us"}))
        .unwrap();

    // No identity header.
    let req = test::TestRequest::post()
        .uri("/admin/finalize")
        .set_json(serde_json::json!({"draftId": draft.id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // Not an operator.
    let req = test::TestRequest::post()
        .uri("/admin/finalize")
        .set_json(serde_json::json!({"draftId": draft.id}))
        .insert_header(("x-user-id", "u1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // An operator unblocks the draft with a synthetic payment id.
    world.profiles.grant_operator("admin-1");
    let req = test::TestRequest::post()
        .uri("/admin/finalize")
        .set_json(serde_json::json!({"draftId": draft.id}))
        .insert_header(("x-user-id", "admin-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let page_id = body["pageId"].as_str().unwrap();

    let page = world.pages.get(page_id).unwrap().unwrap();
    assert!(page.payment_id.starts_with("manual-"));
}

#[actix_rt::test]
async fn pages_endpoint_serves_and_expires() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::get().uri("/pages/none").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    world
        .pages
        .put(&PermanentPage {
            id: "P-live".to_string(),
            draft_id: "D-live".to_string(),
            owner_id: "u1".to_string(),
            content: serde_json::json!({"title": "Us"}),
            payment_id: "pay_1".to_string(),
            created_at: 1_700_000_000,
            expire_at: None,
        })
        .unwrap();
    world
        .pages
        .put(&PermanentPage {
            id: "P-gone".to_string(),
            draft_id: "D-gone".to_string(),
            owner_id: "u1".to_string(),
            content: serde_json::json!({}),
            payment_id: "pay_2".to_string(),
            created_at: 1_700_000_000,
            expire_at: Some(1_700_000_001),
        })
        .unwrap();

    let req = test::TestRequest::get().uri("/pages/P-live").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["content"]["title"], serde_json::json!("Us"));

    let req = test::TestRequest::get().uri("/pages/P-gone").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 410);
}

#[actix_rt::test]
async fn metrics_refuses_without_token() {
    let world = make_world(PIX_SECRET, STRIPE_SECRET);
    let app = init_app!(world);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
