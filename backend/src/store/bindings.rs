use super::Store;
use crate::error::SyncError;
use crate::secret::SecretCodec;
use crate::source::SourceCredentials;
use chrono::{DateTime, Utc};
use common::model::binding::BindingSummary;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};

/// A saved link between one source database and one spreadsheet.
///
/// `secret` is stored encrypted; use [`SourceBinding::credentials`] to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBinding {
    pub id: String,
    pub account_id: String,
    pub host: String,
    pub principal: String,
    pub secret: String,
    pub database_name: String,
    pub sheet_url: String,
    pub collection_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SourceBinding {
    pub fn credentials(&self, codec: &SecretCodec) -> Result<SourceCredentials, SyncError> {
        Ok(SourceCredentials {
            host: self.host.clone(),
            principal: self.principal.clone(),
            secret: codec.decrypt(&self.secret)?,
        })
    }

    pub fn summary(&self) -> BindingSummary {
        BindingSummary {
            id: self.id.clone(),
            title: self.database_name.clone(),
            host: self.host.clone(),
            sheet_url: self.sheet_url.clone(),
            collection_names: self.collection_names.clone(),
            created_at: self.created_at,
        }
    }
}

const BINDING_COLUMNS: &str = "id, account_id, host, principal, secret, database_name, \
                               sheet_url, collection_names, created_at";

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<SourceBinding> {
    let names: String = row.get(7)?;
    let collection_names = serde_json::from_str(&names).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(error))
    })?;
    Ok(SourceBinding {
        id: row.get(0)?,
        account_id: row.get(1)?,
        host: row.get(2)?,
        principal: row.get(3)?,
        secret: row.get(4)?,
        database_name: row.get(5)?,
        sheet_url: row.get(6)?,
        collection_names,
        created_at: row.get(8)?,
    })
}

/// Id of a binding of `account_id` mirroring `database_name` from `host` or into
/// `sheet_url`.
fn duplicate_of(
    conn: &Connection,
    account_id: &str,
    host: &str,
    database_name: &str,
    sheet_url: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM bindings
         WHERE account_id = ?1 AND database_name = ?2 AND (host = ?3 OR sheet_url = ?4)
         LIMIT 1",
        params![account_id, database_name, host, sheet_url],
        |row| row.get(0),
    )
    .optional()
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl Store {
    /// Stores `binding` unless its account already mirrors the same database.
    ///
    /// The duplicate lookup and the insert run under one lock, so of two concurrent
    /// syncs of the same database only one is stored; the other gets `DuplicateBinding`.
    pub fn insert_binding(&self, binding: &SourceBinding) -> Result<(), SyncError> {
        let names = serde_json::to_string(&binding.collection_names)?;
        let duplicate = || SyncError::DuplicateBinding {
            database: binding.database_name.clone(),
        };
        let conn = self.conn();
        if duplicate_of(
            &conn,
            &binding.account_id,
            &binding.host,
            &binding.database_name,
            &binding.sheet_url,
        )?
        .is_some()
        {
            return Err(duplicate());
        }
        conn.execute(
            &format!(
                "INSERT INTO bindings ({BINDING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                binding.id,
                binding.account_id,
                binding.host,
                binding.principal,
                binding.secret,
                binding.database_name,
                binding.sheet_url,
                names,
                binding.created_at
            ],
        )
        .map_err(|error| {
            if is_unique_violation(&error) {
                duplicate()
            } else {
                error.into()
            }
        })?;
        Ok(())
    }

    pub fn binding(&self, id: &str) -> Result<Option<SourceBinding>, SyncError> {
        let binding = self
            .conn()
            .query_row(
                &format!("SELECT {BINDING_COLUMNS} FROM bindings WHERE id = ?1"),
                params![id],
                binding_from_row,
            )
            .optional()?;
        Ok(binding)
    }

    pub fn all_bindings(&self) -> Result<Vec<SourceBinding>, SyncError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BINDING_COLUMNS} FROM bindings ORDER BY created_at, rowid"
        ))?;
        let bindings = stmt
            .query_map([], binding_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bindings)
    }

    pub fn bindings_for_account(&self, account_id: &str) -> Result<Vec<SourceBinding>, SyncError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BINDING_COLUMNS} FROM bindings WHERE account_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let bindings = stmt
            .query_map(params![account_id], binding_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bindings)
    }

    /// Finds a binding of `account_id` that mirrors the same database, either from the same
    /// host or into the same spreadsheet.
    pub fn find_duplicate_binding(
        &self,
        account_id: &str,
        host: &str,
        database_name: &str,
        sheet_url: &str,
    ) -> Result<Option<String>, SyncError> {
        Ok(duplicate_of(
            &self.conn(),
            account_id,
            host,
            database_name,
            sheet_url,
        )?)
    }

    /// Deletes a binding; its sync tasks and change-log entries go with it.
    pub fn delete_binding(&self, id: &str) -> Result<bool, SyncError> {
        let deleted = self
            .conn()
            .execute("DELETE FROM bindings WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::Account;

    pub(crate) fn sample_binding(id: &str, account_id: &str) -> SourceBinding {
        SourceBinding {
            id: id.to_string(),
            account_id: account_id.to_string(),
            host: "cluster0.example.net".to_string(),
            principal: "reader".to_string(),
            secret: "enc:v1:stub".to_string(),
            database_name: "shop".to_string(),
            sheet_url: "https://docs.google.com/spreadsheets/d/sheet-1/edit".to_string(),
            collection_names: vec!["users".to_string(), "orders".to_string()],
            created_at: Utc::now(),
        }
    }

    fn store_with_account() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_account(&Account::new("acc-1", "access", "refresh"))
            .unwrap();
        store
    }

    #[test]
    fn bindings_round_trip_through_store() {
        let store = store_with_account();
        let binding = sample_binding("b-1", "acc-1");
        store.insert_binding(&binding).unwrap();

        assert_eq!(store.binding("b-1").unwrap(), Some(binding));
        let owned: Vec<_> = store
            .bindings_for_account("acc-1")
            .unwrap()
            .into_iter()
            .map(|binding| binding.id)
            .collect();
        assert_eq!(owned, vec!["b-1"]);
        assert_eq!(store.all_bindings().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_lookup_is_scoped_to_account_and_database() {
        let store = store_with_account();
        store
            .upsert_account(&Account::new("acc-2", "access-2", "refresh-2"))
            .unwrap();
        store.insert_binding(&sample_binding("b-1", "acc-1")).unwrap();

        let same_host = store
            .find_duplicate_binding("acc-1", "cluster0.example.net", "shop", "other")
            .unwrap();
        assert_eq!(same_host.as_deref(), Some("b-1"));

        let same_sheet = store
            .find_duplicate_binding(
                "acc-1",
                "elsewhere.example.net",
                "shop",
                "https://docs.google.com/spreadsheets/d/sheet-1/edit",
            )
            .unwrap();
        assert_eq!(same_sheet.as_deref(), Some("b-1"));

        assert!(store
            .find_duplicate_binding("acc-1", "cluster0.example.net", "billing", "other")
            .unwrap()
            .is_none());
        assert!(store
            .find_duplicate_binding("acc-2", "cluster0.example.net", "shop", "other")
            .unwrap()
            .is_none());
    }

    #[test]
    fn second_binding_of_same_database_is_refused() {
        let store = store_with_account();
        store.insert_binding(&sample_binding("b-1", "acc-1")).unwrap();

        let mut again = sample_binding("b-2", "acc-1");
        again.sheet_url = "https://docs.google.com/spreadsheets/d/sheet-2/edit".to_string();
        let err = store.insert_binding(&again).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateBinding { .. }));
        assert_eq!(store.all_bindings().unwrap().len(), 1);
    }

    #[test]
    fn binding_requires_existing_account() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_binding(&sample_binding("b-1", "ghost")).is_err());
    }
}
