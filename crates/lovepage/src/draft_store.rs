//! Draft (payment intent) storage.
//!
//! A draft is created on the first autosave of an in-progress page, mutated
//! while the user edits and pays, and transitions to `completed` exactly
//! once. The transition is an atomic conditional update — the only way to
//! complete a draft is [`DraftStore::try_complete`], so two concurrent
//! finalize attempts can never both win.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

use crate::error::LovepageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Completed,
}

impl DraftStatus {
    fn as_str(self) -> &'static str {
        match self {
            DraftStatus::Pending => "pending",
            DraftStatus::Completed => "completed",
        }
    }
}

/// Mutable record of an in-progress, possibly-paid page.
///
/// Once `status` is `Completed`, `love_page_id` is non-null and stable
/// forever; the store refuses all further writes. Drafts are never deleted
/// (audit trail) — only temporary media of long-abandoned pending drafts is
/// pruned, by a sweep outside this module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: String,
    pub owner_id: String,
    pub content: Value,
    pub status: DraftStatus,
    pub payment_id: Option<String>,
    pub love_page_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Outcome of the atomic completion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// This caller performed the pending → completed transition.
    Won,
    /// Another caller completed the draft first; converge on its page.
    AlreadyCompleted { page_id: String },
}

pub trait DraftStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Draft>, LovepageError>;

    /// Autosave: create the draft on the first call (no id yet), merge the
    /// payload into the existing content on subsequent calls. Completed
    /// drafts are read-only and refuse the write.
    fn save_content(
        &self,
        id: Option<&str>,
        owner_id: &str,
        content: &Value,
    ) -> Result<Draft, LovepageError>;

    /// Stamp the provider's payment id onto a pending draft.
    fn set_payment_id(&self, id: &str, payment_id: &str) -> Result<(), LovepageError>;

    /// Atomically mark the draft completed iff it is still pending, binding
    /// it to `page_id` and `payment_id`. Single-writer-wins: exactly one
    /// concurrent caller observes [`Completion::Won`].
    fn try_complete(
        &self,
        id: &str,
        page_id: &str,
        payment_id: &str,
    ) -> Result<Completion, LovepageError>;

    /// Pending drafts not touched for `older_than_secs`, for the temporary
    /// media retention sweep.
    fn stale_pending(&self, older_than_secs: i64) -> Result<Vec<Draft>, LovepageError>;
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Shallow merge: top-level keys of `incoming` replace those of `base`.
fn merge_content(base: &Value, incoming: &Value) -> Value {
    match (base, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let mut merged = old.clone();
            for (k, v) in new {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

/// In-memory draft store backed by DashMap. For tests and ephemeral runs.
pub struct InMemoryDraftStore {
    drafts: DashMap<String, Draft>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self {
            drafts: DashMap::new(),
        }
    }
}

impl Default for InMemoryDraftStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DraftStore for InMemoryDraftStore {
    fn get(&self, id: &str) -> Result<Option<Draft>, LovepageError> {
        Ok(self.drafts.get(id).map(|d| d.clone()))
    }

    fn save_content(
        &self,
        id: Option<&str>,
        owner_id: &str,
        content: &Value,
    ) -> Result<Draft, LovepageError> {
        let now = unix_now();
        match id {
            Some(id) => {
                let mut entry = self
                    .drafts
                    .get_mut(id)
                    .ok_or_else(|| LovepageError::DraftNotFound(id.to_string()))?;
                if entry.status == DraftStatus::Completed {
                    return Err(LovepageError::Validation(
                        "draft is completed and read-only".to_string(),
                    ));
                }
                let merged = merge_content(&entry.content, content);
                entry.content = merged;
                entry.updated_at = now;
                Ok(entry.clone())
            }
            None => {
                let draft = Draft {
                    id: uuid::Uuid::new_v4().to_string(),
                    owner_id: owner_id.to_string(),
                    content: content.clone(),
                    status: DraftStatus::Pending,
                    payment_id: None,
                    love_page_id: None,
                    created_at: now,
                    updated_at: now,
                };
                self.drafts.insert(draft.id.clone(), draft.clone());
                Ok(draft)
            }
        }
    }

    fn set_payment_id(&self, id: &str, payment_id: &str) -> Result<(), LovepageError> {
        let mut entry = self
            .drafts
            .get_mut(id)
            .ok_or_else(|| LovepageError::DraftNotFound(id.to_string()))?;
        if entry.status == DraftStatus::Completed {
            return Err(LovepageError::Validation(
                "draft is completed and read-only".to_string(),
            ));
        }
        entry.payment_id = Some(payment_id.to_string());
        entry.updated_at = unix_now();
        Ok(())
    }

    fn try_complete(
        &self,
        id: &str,
        page_id: &str,
        payment_id: &str,
    ) -> Result<Completion, LovepageError> {
        // The DashMap entry guard serializes access to this draft, making
        // the check-and-set a single atomic step within the process.
        let mut entry = self
            .drafts
            .get_mut(id)
            .ok_or_else(|| LovepageError::DraftNotFound(id.to_string()))?;
        match entry.status {
            DraftStatus::Completed => {
                let page_id = entry.love_page_id.clone().ok_or_else(|| {
                    LovepageError::Storage("completed draft without page id".to_string())
                })?;
                Ok(Completion::AlreadyCompleted { page_id })
            }
            DraftStatus::Pending => {
                entry.status = DraftStatus::Completed;
                entry.love_page_id = Some(page_id.to_string());
                entry.payment_id = Some(payment_id.to_string());
                entry.updated_at = unix_now();
                Ok(Completion::Won)
            }
        }
    }

    fn stale_pending(&self, older_than_secs: i64) -> Result<Vec<Draft>, LovepageError> {
        let cutoff = unix_now() - older_than_secs;
        Ok(self
            .drafts
            .iter()
            .filter(|d| d.status == DraftStatus::Pending && d.updated_at < cutoff)
            .map(|d| d.clone())
            .collect())
    }
}

/// Persistent draft store backed by SQLite. Survives restarts.
pub struct SqliteDraftStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteDraftStore {
    /// Open (or create) the draft database at the given path.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS drafts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                payment_id TEXT,
                love_page_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_drafts_status_updated
                ON drafts(status, updated_at);
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, LovepageError> {
        self.conn
            .lock()
            .map_err(|_| LovepageError::Storage("draft store lock poisoned".to_string()))
    }
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<Draft> {
    let content: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Draft {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: serde_json::from_str(&content).unwrap_or(Value::Null),
        status: if status == "completed" {
            DraftStatus::Completed
        } else {
            DraftStatus::Pending
        },
        payment_id: row.get(4)?,
        love_page_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const DRAFT_COLUMNS: &str =
    "id, owner_id, content, status, payment_id, love_page_id, created_at, updated_at";

impl DraftStore for SqliteDraftStore {
    fn get(&self, id: &str) -> Result<Option<Draft>, LovepageError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock()?;
        let draft = conn
            .query_row(
                &format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = ?1"),
                [id],
                row_to_draft,
            )
            .optional()?;
        Ok(draft)
    }

    fn save_content(
        &self,
        id: Option<&str>,
        owner_id: &str,
        content: &Value,
    ) -> Result<Draft, LovepageError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock()?;
        let now = unix_now();
        match id {
            Some(id) => {
                // Read, merge, and write under the connection lock so
                // concurrent autosaves cannot tear the merge.
                let existing = conn
                    .query_row(
                        &format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = ?1"),
                        [id],
                        row_to_draft,
                    )
                    .optional()?
                    .ok_or_else(|| LovepageError::DraftNotFound(id.to_string()))?;
                if existing.status == DraftStatus::Completed {
                    return Err(LovepageError::Validation(
                        "draft is completed and read-only".to_string(),
                    ));
                }
                let merged = merge_content(&existing.content, content);
                conn.execute(
                    "UPDATE drafts SET content = ?2, updated_at = ?3
                     WHERE id = ?1 AND status = 'pending'",
                    rusqlite::params![id, serde_json::to_string(&merged)?, now],
                )?;
                Ok(Draft {
                    content: merged,
                    updated_at: now,
                    ..existing
                })
            }
            None => {
                let draft = Draft {
                    id: uuid::Uuid::new_v4().to_string(),
                    owner_id: owner_id.to_string(),
                    content: content.clone(),
                    status: DraftStatus::Pending,
                    payment_id: None,
                    love_page_id: None,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    "INSERT INTO drafts (id, owner_id, content, status, payment_id, love_page_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5)",
                    rusqlite::params![
                        draft.id,
                        draft.owner_id,
                        serde_json::to_string(&draft.content)?,
                        draft.status.as_str(),
                        now
                    ],
                )?;
                Ok(draft)
            }
        }
    }

    fn set_payment_id(&self, id: &str, payment_id: &str) -> Result<(), LovepageError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE drafts SET payment_id = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, payment_id, unix_now()],
        )?;
        if updated == 0 {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM drafts WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            return if exists == 0 {
                Err(LovepageError::DraftNotFound(id.to_string()))
            } else {
                Err(LovepageError::Validation(
                    "draft is completed and read-only".to_string(),
                ))
            };
        }
        Ok(())
    }

    fn try_complete(
        &self,
        id: &str,
        page_id: &str,
        payment_id: &str,
    ) -> Result<Completion, LovepageError> {
        use rusqlite::OptionalExtension;
        let conn = self.lock()?;
        // A single conditional UPDATE — atomic at the database level, safe
        // across processes. Exactly one concurrent caller sees one changed
        // row; everyone else reads the winner's page id below.
        let updated = conn.execute(
            "UPDATE drafts
             SET status = 'completed', love_page_id = ?2, payment_id = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, page_id, payment_id, unix_now()],
        )?;
        if updated == 1 {
            return Ok(Completion::Won);
        }
        let existing: Option<Option<String>> = conn
            .query_row(
                "SELECT love_page_id FROM drafts WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            None => Err(LovepageError::DraftNotFound(id.to_string())),
            Some(Some(page_id)) => Ok(Completion::AlreadyCompleted { page_id }),
            Some(None) => Err(LovepageError::Storage(
                "completed draft without page id".to_string(),
            )),
        }
    }

    fn stale_pending(&self, older_than_secs: i64) -> Result<Vec<Draft>, LovepageError> {
        let conn = self.lock()?;
        let cutoff = unix_now() - older_than_secs;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts
             WHERE status = 'pending' AND updated_at < ?1"
        ))?;
        let drafts = stmt
            .query_map([cutoff], row_to_draft)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(drafts)
    }
}
