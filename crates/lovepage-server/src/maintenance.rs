//! Background retention sweep.
//!
//! Drafts are never deleted (they are the audit trail), but temporary
//! media attached to drafts that were abandoned before payment is pruned
//! after a retention window.

use std::sync::Arc;
use std::time::Duration;

use lovepage::content::PageContent;
use lovepage::draft_store::DraftStore;
use lovepage::object_store::ObjectStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Delete temporary media of pending drafts older than the retention
/// window. Returns the number of objects deleted.
pub fn sweep_stale_draft_media(
    drafts: &Arc<dyn DraftStore>,
    objects: &Arc<dyn ObjectStore>,
    retention_secs: i64,
) -> usize {
    let stale = match drafts.stale_pending(retention_secs) {
        Ok(stale) => stale,
        Err(e) => {
            tracing::warn!(error = %e, "retention sweep could not list stale drafts");
            return 0;
        }
    };

    let mut deleted = 0;
    for draft in &stale {
        let content = PageContent::from_value(&draft.content);
        for media in content.media_refs() {
            if !media.is_temporary() {
                continue;
            }
            match objects.delete(&media.path) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(draft_id = %draft.id, path = %media.path, error = %e,
                        "retention sweep failed to delete object");
                }
            }
        }
    }
    if deleted > 0 {
        tracing::info!(deleted, drafts = stale.len(), "retention sweep pruned temporary media");
    }
    deleted
}

/// Spawn the hourly sweep task.
pub fn start_media_sweep(
    drafts: Arc<dyn DraftStore>,
    objects: Arc<dyn ObjectStore>,
    retention_days: u64,
) {
    let retention_secs = (retention_days * 86_400) as i64;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep_stale_draft_media(&drafts, &objects, retention_secs);
        }
    });
}
