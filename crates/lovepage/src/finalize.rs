//! The idempotent finalizer: turn a paid draft into a permanent page,
//! exactly once, no matter how many triggers race to do it.
//!
//! Four uncoordinated callers can invoke [`Finalizer::finalize`] for the
//! same draft — the provider webhook, the client poll loop, the redirect
//! return page and an operator override. Whoever wins the atomic
//! completion claim determines the one page id; everyone else converges
//! on it.

use std::sync::Arc;

use crate::content::PageContent;
use crate::draft_store::{Completion, Draft, DraftStatus, DraftStore};
use crate::error::LovepageError;
use crate::object_store::ObjectStore;
use crate::page_store::{PageStore, PageSummary, PermanentPage};
use crate::plan;
use crate::profile::ProfileStore;
use crate::promote::AssetPromoter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub page_id: String,
    /// False when the draft was already completed (short-circuit) or a
    /// concurrent caller won the completion race.
    pub newly_completed: bool,
}

#[derive(Clone)]
pub struct Finalizer {
    drafts: Arc<dyn DraftStore>,
    pages: Arc<dyn PageStore>,
    profiles: Arc<dyn ProfileStore>,
    promoter: AssetPromoter,
}

impl Finalizer {
    pub fn new(
        drafts: Arc<dyn DraftStore>,
        pages: Arc<dyn PageStore>,
        objects: Arc<dyn ObjectStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            drafts,
            pages,
            profiles,
            promoter: AssetPromoter::new(objects),
        }
    }

    /// Materialize the permanent page for a paid draft.
    ///
    /// Safe to invoke repeatedly and concurrently: an already-completed
    /// draft short-circuits to its existing page id regardless of which
    /// `payment_id` triggered the call, and a failure partway through can
    /// simply be retried — every side effect is written to converge.
    pub fn finalize(
        &self,
        draft_id: &str,
        payment_id: &str,
    ) -> Result<FinalizeOutcome, LovepageError> {
        let draft = self
            .drafts
            .get(draft_id)?
            .ok_or_else(|| LovepageError::DraftNotFound(draft_id.to_string()))?;

        // Fast path: already finalized. The authoritative guard is the
        // atomic claim below; this read only skips the side-effect work.
        if draft.status == DraftStatus::Completed {
            let page_id = existing_page_id(&draft)?;
            tracing::info!(draft_id, page_id = %page_id, "draft already finalized");
            return Ok(FinalizeOutcome {
                page_id,
                newly_completed: false,
            });
        }

        let mut content = PageContent::from_value(&draft.content);

        // Reuse a page written by a previously failed attempt rather than
        // minting a duplicate.
        let page_id = match self
            .pages
            .find_by_draft(draft_id)
            .map_err(|e| LovepageError::finalize("find-existing-page", e))?
        {
            Some(existing) => {
                tracing::info!(draft_id, page_id = %existing, "reusing page from earlier attempt");
                existing
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        self.promoter.promote_content(&mut content, &page_id);

        let now = chrono::Utc::now();
        let expire_at = plan::expire_at(content.plan, now).map(|t| t.timestamp());

        let page = PermanentPage {
            id: page_id.clone(),
            draft_id: draft_id.to_string(),
            owner_id: draft.owner_id.clone(),
            content: content
                .to_document()
                .map_err(|e| LovepageError::finalize("normalize-content", e))?,
            payment_id: payment_id.to_string(),
            created_at: now.timestamp(),
            expire_at,
        };
        self.pages
            .put(&page)
            .map_err(|e| LovepageError::finalize("write-page", e))?;

        self.pages
            .append_owner_index(
                &draft.owner_id,
                &PageSummary {
                    id: page_id.clone(),
                    title: content.title.clone(),
                    created_at: page.created_at,
                },
            )
            .map_err(|e| LovepageError::finalize("owner-index", e))?;

        match self.drafts.try_complete(draft_id, &page_id, payment_id)? {
            Completion::Won => {
                tracing::info!(
                    draft_id,
                    page_id = %page_id,
                    payment_id,
                    plan = content.plan.as_str(),
                    "draft finalized"
                );
                Ok(FinalizeOutcome {
                    page_id,
                    newly_completed: true,
                })
            }
            Completion::AlreadyCompleted { page_id: winner } => {
                if winner != page_id {
                    tracing::warn!(
                        draft_id,
                        winner = %winner,
                        orphan = %page_id,
                        "lost completion race after writing page"
                    );
                }
                Ok(FinalizeOutcome {
                    page_id: winner,
                    newly_completed: false,
                })
            }
        }
    }

    /// Operator override: manually unblock a stuck draft.
    ///
    /// The caller must hold the operator role; the page is finalized with
    /// a synthetic payment id.
    pub fn finalize_as_operator(
        &self,
        caller_id: &str,
        draft_id: &str,
    ) -> Result<FinalizeOutcome, LovepageError> {
        if !self.profiles.is_operator(caller_id)? {
            tracing::warn!(caller_id, draft_id, "operator finalize refused");
            return Err(LovepageError::Unauthorized);
        }
        let payment_id = format!("manual-{}", uuid::Uuid::new_v4());
        tracing::info!(caller_id, draft_id, payment_id = %payment_id, "operator finalize");
        self.finalize(draft_id, &payment_id)
    }
}

fn existing_page_id(draft: &Draft) -> Result<String, LovepageError> {
    draft
        .love_page_id
        .clone()
        .ok_or_else(|| LovepageError::Storage("completed draft without page id".to_string()))
}
