//! Operator lookup for the manual finalize override.
//!
//! The override is gated on the caller's profile carrying the operator
//! role — there is no env-var allow-list, so revoking an operator is a
//! profile update, not a redeploy.

use dashmap::DashMap;
use std::sync::Mutex;

use crate::error::LovepageError;

pub trait ProfileStore: Send + Sync {
    /// Whether the caller id belongs to the operator allow-list. Unknown
    /// callers are not operators.
    fn is_operator(&self, user_id: &str) -> Result<bool, LovepageError>;
}

/// In-memory profile store.
pub struct InMemoryProfileStore {
    operators: DashMap<String, ()>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            operators: DashMap::new(),
        }
    }

    pub fn grant_operator(&self, user_id: &str) {
        self.operators.insert(user_id.to_string(), ());
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn is_operator(&self, user_id: &str) -> Result<bool, LovepageError> {
        Ok(self.operators.contains_key(user_id))
    }
}

/// Persistent profile store backed by SQLite.
pub struct SqliteProfileStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteProfileStore {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                role TEXT NOT NULL DEFAULT 'user'
            );
            PRAGMA journal_mode=WAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn grant_operator(&self, user_id: &str) -> Result<(), LovepageError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LovepageError::Storage("profile store lock poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO profiles (user_id, role) VALUES (?1, 'operator')
             ON CONFLICT(user_id) DO UPDATE SET role = 'operator'",
            [user_id],
        )?;
        Ok(())
    }
}

impl ProfileStore for SqliteProfileStore {
    fn is_operator(&self, user_id: &str) -> Result<bool, LovepageError> {
        use rusqlite::OptionalExtension;
        let conn = self
            .conn
            .lock()
            .map_err(|_| LovepageError::Storage("profile store lock poisoned".to_string()))?;
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM profiles WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role.as_deref() == Some("operator"))
    }
}
