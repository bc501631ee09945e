//! Permanent page storage and the per-owner page index.
//!
//! A permanent page is written once at finalization and never mutated here
//! (content edits go through a separate authenticated path). The store
//! enforces the 1:1 draft → page mapping: `find_by_draft` lets the
//! finalizer reuse a page written by a previously failed attempt, and the
//! SQLite backend carries a UNIQUE index on `draft_id` as a backstop.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

use crate::error::LovepageError;

/// The immutable, publicly servable artifact produced from a paid draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermanentPage {
    pub id: String,
    pub draft_id: String,
    pub owner_id: String,
    /// Normalized content document (explicit nulls, canonical timestamps,
    /// promoted media references).
    pub content: Value,
    pub payment_id: String,
    pub created_at: i64,
    /// Set only for constrained-tier pages.
    pub expire_at: Option<i64>,
}

impl PermanentPage {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at.is_some_and(|t| t <= now)
    }
}

/// Lightweight pointer record under the owner's page index, for listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: String,
    pub title: Option<String>,
    pub created_at: i64,
}

pub trait PageStore: Send + Sync {
    /// Write a new permanent page. Writing a second page for the same
    /// draft converges on the existing one instead of erroring.
    fn put(&self, page: &PermanentPage) -> Result<(), LovepageError>;

    fn get(&self, id: &str) -> Result<Option<PermanentPage>, LovepageError>;

    /// Page already produced from this draft, if any — consulted before
    /// minting a fresh page id so a retry after partial failure does not
    /// create a duplicate.
    fn find_by_draft(&self, draft_id: &str) -> Result<Option<String>, LovepageError>;

    /// Append the owner-index pointer record.
    fn append_owner_index(
        &self,
        owner_id: &str,
        summary: &PageSummary,
    ) -> Result<(), LovepageError>;

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<PageSummary>, LovepageError>;
}

/// In-memory page store backed by DashMap.
pub struct InMemoryPageStore {
    pages: DashMap<String, PermanentPage>,
    by_draft: DashMap<String, String>,
    owner_index: DashMap<String, Vec<PageSummary>>,
}

impl InMemoryPageStore {
    pub fn new() -> Self {
        Self {
            pages: DashMap::new(),
            by_draft: DashMap::new(),
            owner_index: DashMap::new(),
        }
    }
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for InMemoryPageStore {
    fn put(&self, page: &PermanentPage) -> Result<(), LovepageError> {
        use dashmap::mapref::entry::Entry;
        // Claim the draft slot first; the entry API makes the claim atomic.
        match self.by_draft.entry(page.draft_id.clone()) {
            Entry::Occupied(existing) => {
                if existing.get() != &page.id {
                    tracing::warn!(
                        draft_id = %page.draft_id,
                        existing = %existing.get(),
                        rejected = %page.id,
                        "second page write for draft ignored"
                    );
                }
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(page.id.clone());
                self.pages.insert(page.id.clone(), page.clone());
                Ok(())
            }
        }
    }

    fn get(&self, id: &str) -> Result<Option<PermanentPage>, LovepageError> {
        Ok(self.pages.get(id).map(|p| p.clone()))
    }

    fn find_by_draft(&self, draft_id: &str) -> Result<Option<String>, LovepageError> {
        Ok(self.by_draft.get(draft_id).map(|id| id.clone()))
    }

    fn append_owner_index(
        &self,
        owner_id: &str,
        summary: &PageSummary,
    ) -> Result<(), LovepageError> {
        let mut entries = self.owner_index.entry(owner_id.to_string()).or_default();
        if !entries.iter().any(|s| s.id == summary.id) {
            entries.push(summary.clone());
        }
        Ok(())
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<PageSummary>, LovepageError> {
        Ok(self
            .owner_index
            .get(owner_id)
            .map(|entries| entries.clone())
            .unwrap_or_default())
    }
}

/// Persistent page store backed by SQLite.
pub struct SqlitePageStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqlitePageStore {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pages (
                id TEXT PRIMARY KEY,
                draft_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                content TEXT NOT NULL,
                payment_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expire_at INTEGER
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_pages_draft ON pages(draft_id);
            CREATE TABLE IF NOT EXISTS owner_pages (
                owner_id TEXT NOT NULL,
                page_id TEXT NOT NULL,
                title TEXT,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (owner_id, page_id)
            );
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, LovepageError> {
        self.conn
            .lock()
            .map_err(|_| LovepageError::Storage("page store lock poisoned".to_string()))
    }
}

fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermanentPage> {
    let content: String = row.get(3)?;
    Ok(PermanentPage {
        id: row.get(0)?,
        draft_id: row.get(1)?,
        owner_id: row.get(2)?,
        content: serde_json::from_str(&content).unwrap_or(Value::Null),
        payment_id: row.get(4)?,
        created_at: row.get(5)?,
        expire_at: row.get(6)?,
    })
}

impl PageStore for SqlitePageStore {
    fn put(&self, page: &PermanentPage) -> Result<(), LovepageError> {
        let conn = self.lock()?;
        // UNIQUE(draft_id) turns a duplicate write into a no-op; the
        // earlier row stays authoritative.
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO pages (id, draft_id, owner_id, content, payment_id, created_at, expire_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                page.id,
                page.draft_id,
                page.owner_id,
                serde_json::to_string(&page.content)?,
                page.payment_id,
                page.created_at,
                page.expire_at
            ],
        )?;
        if inserted == 0 {
            tracing::warn!(
                draft_id = %page.draft_id,
                rejected = %page.id,
                "second page write for draft ignored"
            );
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<PermanentPage>, LovepageError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock()?;
        let page = conn
            .query_row(
                "SELECT id, draft_id, owner_id, content, payment_id, created_at, expire_at
                 FROM pages WHERE id = ?1",
                [id],
                row_to_page,
            )
            .optional()?;
        Ok(page)
    }

    fn find_by_draft(&self, draft_id: &str) -> Result<Option<String>, LovepageError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock()?;
        let id = conn
            .query_row(
                "SELECT id FROM pages WHERE draft_id = ?1",
                [draft_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn append_owner_index(
        &self,
        owner_id: &str,
        summary: &PageSummary,
    ) -> Result<(), LovepageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO owner_pages (owner_id, page_id, title, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![owner_id, summary.id, summary.title, summary.created_at],
        )?;
        Ok(())
    }

    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<PageSummary>, LovepageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT page_id, title, created_at FROM owner_pages
             WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let summaries = stmt
            .query_map([owner_id], |row| {
                Ok(PageSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }
}
