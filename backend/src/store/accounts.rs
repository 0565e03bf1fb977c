use super::Store;
use crate::error::SyncError;
use crate::sheets::OAuthTokens;
use rusqlite::{params, OptionalExtension};

/// An account that owns bindings; holds the OAuth pair used for sheet calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Sandbox accounts get change-log entries but no cell writes.
    pub sandbox: bool,
}

impl Account {
    pub fn new(id: &str, access_token: &str, refresh_token: &str) -> Self {
        Self {
            id: id.to_string(),
            email: String::new(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            sandbox: false,
        }
    }

    pub fn tokens(&self) -> OAuthTokens {
        OAuthTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

impl Store {
    pub fn upsert_account(&self, account: &Account) -> Result<(), SyncError> {
        self.conn().execute(
            "INSERT INTO accounts (id, email, oauth_access_token, oauth_refresh_token, sandbox)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                oauth_access_token = excluded.oauth_access_token,
                oauth_refresh_token = excluded.oauth_refresh_token,
                sandbox = excluded.sandbox",
            params![
                account.id,
                account.email,
                account.access_token,
                account.refresh_token,
                account.sandbox
            ],
        )?;
        Ok(())
    }

    pub fn account(&self, id: &str) -> Result<Option<Account>, SyncError> {
        let account = self
            .conn()
            .query_row(
                "SELECT id, email, oauth_access_token, oauth_refresh_token, sandbox
                 FROM accounts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        sandbox: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_tokens() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_account(&Account::new("acc-1", "a1", "r1"))
            .unwrap();
        let mut renewed = Account::new("acc-1", "a2", "r2");
        renewed.sandbox = true;
        store.upsert_account(&renewed).unwrap();

        let account = store.account("acc-1").unwrap().unwrap();
        assert_eq!(
            account.tokens(),
            OAuthTokens {
                access_token: "a2".to_string(),
                refresh_token: "r2".to_string(),
            }
        );
        assert!(account.sandbox);
    }

    #[test]
    fn unknown_account_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.account("missing").unwrap().is_none());
    }
}
