//! Asset promotion: moving media from the temporary per-user area to the
//! permanent per-page area at finalization.
//!
//! Promotion is deliberately total — a failed move degrades the page to
//! pointing at the temporary asset instead of aborting the finalize. The
//! missing-source/existing-destination case is treated as success so
//! concurrent duplicate finalize attempts cannot fail each other.

use std::sync::Arc;

use crate::content::{MediaRef, PageContent, PERM_ROOT};
use crate::error::LovepageError;
use crate::object_store::ObjectStore;

/// Destination slot of a media reference, used as a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Cover,
    Gallery,
    Timeline,
    Voice,
}

impl MediaCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaCategory::Cover => "cover",
            MediaCategory::Gallery => "gallery",
            MediaCategory::Timeline => "timeline",
            MediaCategory::Voice => "voice",
        }
    }
}

#[derive(Clone)]
pub struct AssetPromoter {
    objects: Arc<dyn ObjectStore>,
}

impl AssetPromoter {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Move one media reference into `perm/<page_id>/<category>/<filename>`.
    ///
    /// Returns the promoted reference, or the original unchanged when it is
    /// not temporary or the move failed (logged, not fatal).
    pub fn promote(&self, media: &MediaRef, page_id: &str, category: MediaCategory) -> MediaRef {
        if !media.is_temporary() {
            return media.clone();
        }
        let Some(filename) = media.path.rsplit('/').next().filter(|f| !f.is_empty()) else {
            tracing::warn!(path = %media.path, "media reference has no filename, leaving unpromoted");
            return media.clone();
        };
        let dest = format!("{PERM_ROOT}/{page_id}/{}/{filename}", category.as_str());

        match self.objects.copy(&media.path, &dest) {
            Ok(()) => {}
            Err(LovepageError::ObjectNotFound(_)) => {
                // A concurrent finalize attempt may have moved it already.
                match self.objects.exists(&dest) {
                    Ok(true) => {
                        tracing::debug!(
                            src = %media.path,
                            dest = %dest,
                            "source already moved by an earlier attempt"
                        );
                        return self.finish(media, dest);
                    }
                    _ => {
                        tracing::warn!(
                            src = %media.path,
                            "media object missing and not yet promoted, leaving unpromoted"
                        );
                        return media.clone();
                    }
                }
            }
            Err(e) => {
                tracing::warn!(src = %media.path, error = %e, "media copy failed, leaving unpromoted");
                return media.clone();
            }
        }

        if let Err(e) = self.objects.delete(&media.path) {
            // The destination is in place; an undeleted temp object only
            // costs storage until the retention sweep.
            tracing::warn!(src = %media.path, error = %e, "failed to delete promoted source");
        }
        self.finish(media, dest)
    }

    fn finish(&self, original: &MediaRef, dest: String) -> MediaRef {
        match self.objects.make_public(&dest) {
            Ok(url) => MediaRef::new(url, dest),
            Err(e) => {
                tracing::warn!(dest = %dest, error = %e, "failed to publish promoted media");
                original.clone()
            }
        }
    }

    /// Promote every media slot of the content in place, preserving gallery
    /// order and timeline positions.
    pub fn promote_content(&self, content: &mut PageContent, page_id: &str) {
        if let Some(cover) = content.cover.as_mut() {
            *cover = self.promote(cover, page_id, MediaCategory::Cover);
        }
        for media in content.gallery.iter_mut() {
            *media = self.promote(media, page_id, MediaCategory::Gallery);
        }
        for event in content.timeline.iter_mut() {
            if let Some(media) = event.media.as_mut() {
                *media = self.promote(media, page_id, MediaCategory::Timeline);
            }
        }
        if let Some(voice) = content.voice_recording.as_mut() {
            *voice = self.promote(voice, page_id, MediaCategory::Voice);
        }
    }
}
