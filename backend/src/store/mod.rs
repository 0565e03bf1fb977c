//! SQLite persistence for accounts, bindings, sync tasks and the change log.
//!
//! A single connection is shared behind a mutex; every statement is short, so callers
//! lock, run their query and release before the next await point.

pub mod accounts;
pub mod bindings;
pub mod logs;
pub mod tasks;

use crate::error::SyncError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use accounts::Account;
pub use bindings::SourceBinding;
pub use tasks::SyncTask;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL DEFAULT '',
    oauth_access_token TEXT NOT NULL,
    oauth_refresh_token TEXT NOT NULL,
    sandbox INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS bindings (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    host TEXT NOT NULL,
    principal TEXT NOT NULL,
    secret TEXT NOT NULL,
    database_name TEXT NOT NULL,
    sheet_url TEXT NOT NULL,
    collection_names TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS bindings_account ON bindings(account_id);
CREATE UNIQUE INDEX IF NOT EXISTS bindings_source
    ON bindings(account_id, database_name, host);
CREATE TABLE IF NOT EXISTS sync_tasks (
    correlation_id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    phase TEXT NOT NULL,
    binding_id TEXT REFERENCES bindings(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS change_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    message TEXT NOT NULL,
    collection_name TEXT NOT NULL DEFAULT 'all',
    document_id TEXT,
    event_token TEXT,
    binding_id TEXT NOT NULL REFERENCES bindings(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS change_log_token ON change_log(binding_id, event_token);
CREATE INDEX IF NOT EXISTS change_log_document
    ON change_log(binding_id, collection_name, document_id);
";

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, SyncError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SyncError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs raw SQL, for tests that need to break the schema on purpose.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), SyncError> {
        Ok(self.conn().execute_batch(sql)?)
    }
}
