use std::sync::Arc;

use lovepage::draft_store::DraftStore;
use lovepage::finalize::Finalizer;
use lovepage::page_store::PageStore;
use lovepage::paypal::PaypalAdapter;
use lovepage::pix::PixAdapter;
use lovepage::stripe::StripeAdapter;

/// Shared application state. Everything is injected at construction —
/// no ambient globals, no lazily-initialized SDK clients.
pub struct AppState {
    pub drafts: Arc<dyn DraftStore>,
    pub pages: Arc<dyn PageStore>,
    pub finalizer: Finalizer,
    pub stripe: StripeAdapter,
    pub paypal: PaypalAdapter,
    pub pix: PixAdapter,
    /// Secret for the QR provider's webhook signatures.
    pub pix_webhook_secret: Vec<u8>,
    /// Secret for the hosted-checkout provider's webhook signatures.
    pub stripe_webhook_secret: Vec<u8>,
    /// Bearer token for /metrics (None = metrics refuse requests).
    pub metrics_token: Option<Vec<u8>>,
}
