use super::Store;
use crate::error::SyncError;
use chrono::Utc;
use common::model::change_log::{ChangeKind, ChangeLogEntry};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A change-log entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub kind: ChangeKind,
    pub message: String,
    pub collection_name: String,
    pub document_id: Option<String>,
    /// Identity the source gave the event, if any. Used only for dedup.
    pub event_token: Option<String>,
    pub binding_id: String,
}

const LOG_COLUMNS: &str =
    "change_log.id, change_log.kind, change_log.message, change_log.collection_name, \
     change_log.document_id, change_log.binding_id, change_log.created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let kind: String = row.get(1)?;
    Ok(ChangeLogEntry {
        id: row.get(0)?,
        kind: ChangeKind::from(kind),
        message: row.get(2)?,
        collection_name: row.get(3)?,
        document_id: row.get(4)?,
        binding_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn insert_entry(conn: &Connection, entry: &NewLogEntry) -> Result<ChangeLogEntry, SyncError> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO change_log
            (kind, message, collection_name, document_id, event_token, binding_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.kind.as_str(),
            entry.message,
            entry.collection_name,
            entry.document_id,
            entry.event_token,
            entry.binding_id,
            created_at
        ],
    )?;
    Ok(ChangeLogEntry {
        id: conn.last_insert_rowid(),
        kind: entry.kind.clone(),
        message: entry.message.clone(),
        collection_name: entry.collection_name.clone(),
        document_id: entry.document_id.clone(),
        binding_id: entry.binding_id.clone(),
        created_at,
    })
}

impl Store {
    pub fn append_log(&self, entry: &NewLogEntry) -> Result<ChangeLogEntry, SyncError> {
        insert_entry(&self.conn(), entry)
    }

    /// Appends `entry` unless it repeats an event the binding already logged.
    ///
    /// With an event token, any earlier entry with that token makes it a repeat. Without
    /// one, only the latest entry for the same document is compared, by message, so a later
    /// change that reads like an older one is still logged. Returns `None` for a repeat.
    pub fn append_log_if_new(
        &self,
        entry: &NewLogEntry,
    ) -> Result<Option<ChangeLogEntry>, SyncError> {
        let conn = self.conn();
        let repeated: bool = match &entry.event_token {
            Some(token) => conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM change_log WHERE binding_id = ?1 AND event_token = ?2)",
                params![entry.binding_id, token],
                |row| row.get(0),
            )?,
            None => conn
                .query_row(
                    "SELECT message FROM change_log
                     WHERE binding_id = ?1 AND collection_name = ?2 AND document_id IS ?3
                     ORDER BY id DESC LIMIT 1",
                    params![entry.binding_id, entry.collection_name, entry.document_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .is_some_and(|latest| latest == entry.message),
        };
        if repeated {
            return Ok(None);
        }
        insert_entry(&conn, entry).map(Some)
    }

    /// Entries of one binding, newest first.
    pub fn logs_for_binding(&self, binding_id: &str) -> Result<Vec<ChangeLogEntry>, SyncError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM change_log WHERE binding_id = ?1
             ORDER BY change_log.id DESC"
        ))?;
        let entries = stmt
            .query_map(params![binding_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries of every binding owned by `account_id`, newest first.
    pub fn logs_for_account(&self, account_id: &str) -> Result<Vec<ChangeLogEntry>, SyncError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM change_log
             JOIN bindings ON bindings.id = change_log.binding_id
             WHERE bindings.account_id = ?1
             ORDER BY change_log.id DESC"
        ))?;
        let entries = stmt
            .query_map(params![account_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
