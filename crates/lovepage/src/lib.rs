//! Payment finalization core for the lovepage builder.
//!
//! The one hard problem in the product is turning a paid draft into a
//! permanent, publicly servable page when up to four uncoordinated
//! triggers — provider webhook, client poll tick, redirect return,
//! operator override — can all attempt the same transition at once.
//!
//! # Three layers
//!
//! - **Stores** ([`DraftStore`], [`PageStore`], [`ObjectStore`],
//!   [`ProfileStore`]) — injected trait objects over DashMap or SQLite /
//!   filesystem backends; the draft store's atomic [`DraftStore::try_complete`]
//!   is the single-writer-wins guarantee.
//! - **Adapters** ([`StripeAdapter`], [`PaypalAdapter`], [`PixAdapter`]) —
//!   the three payment integrations behind one [`PaymentAdapter`] trait.
//! - **Finalizer** ([`Finalizer`]) — the idempotent core every trigger
//!   funnels into.
//!
//! # Quick example (finalize)
//!
//! ```no_run
//! use std::sync::Arc;
//! use lovepage::{Finalizer, InMemoryDraftStore, InMemoryObjectStore,
//!                InMemoryPageStore, InMemoryProfileStore};
//!
//! let finalizer = Finalizer::new(
//!     Arc::new(InMemoryDraftStore::new()),
//!     Arc::new(InMemoryPageStore::new()),
//!     Arc::new(InMemoryObjectStore::new("https://cdn.example")),
//!     Arc::new(InMemoryProfileStore::new()),
//! );
//! let outcome = finalizer.finalize("draft-id", "payment-id").unwrap();
//! println!("page: {}", outcome.page_id);
//! ```

// Core types and storage
pub mod content;
pub mod draft_store;
pub mod error;
pub mod object_store;
pub mod page_store;
pub mod plan;
pub mod profile;

// The finalization pipeline
pub mod finalize;
pub mod promote;
pub mod security;
pub mod signature;

// Payment integrations
pub mod paypal;
pub mod pix;
pub mod poll;
pub mod provider;
pub mod stripe;

// Re-exports
pub use content::{MediaRef, PageContent, TimelineEvent, Timestamp};
pub use draft_store::{Completion, Draft, DraftStatus, DraftStore, InMemoryDraftStore, SqliteDraftStore};
pub use error::LovepageError;
pub use finalize::{FinalizeOutcome, Finalizer};
pub use object_store::{InMemoryObjectStore, LocalObjectStore, ObjectStore};
pub use page_store::{InMemoryPageStore, PageStore, PageSummary, PermanentPage, SqlitePageStore};
pub use plan::PlanTier;
pub use profile::{InMemoryProfileStore, ProfileStore, SqliteProfileStore};
pub use promote::{AssetPromoter, MediaCategory};
pub use provider::{ChargeHandle, PaymentAdapter, ProofResult};

pub use paypal::PaypalAdapter;
pub use pix::PixAdapter;
pub use stripe::StripeAdapter;
