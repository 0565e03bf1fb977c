//! Access to the destination spreadsheet service.
//!
//! [`google`] talks to the Google Sheets v4 REST API. Ranges are A1 notation
//! (`'users'!B3`), built with [`cell_range`] and [`column_letter`].

pub mod google;

use crate::error::SyncError;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// OAuth token pair of the account that owns the destination spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// One tab of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTab {
    pub sheet_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSpreadsheet {
    pub spreadsheet_id: String,
    pub url: String,
}

/// Structural change applied through a batch update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRequest {
    AddSheet { title: String },
    HideSheet { sheet_id: i64 },
    /// Restrict direct edits of a whole tab to the spreadsheet owner.
    ProtectSheet { sheet_id: i64, description: String },
}

#[async_trait]
pub trait SheetService: Send + Sync {
    async fn create_spreadsheet(
        &self,
        auth: &OAuthTokens,
        title: &str,
    ) -> Result<CreatedSpreadsheet, SyncError>;

    async fn list_tabs(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
    ) -> Result<Vec<SheetTab>, SyncError>;

    /// Applies all `requests` atomically.
    async fn batch_update(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        requests: &[SheetRequest],
    ) -> Result<(), SyncError>;

    async fn append_values(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), SyncError>;

    /// Reads `range`; trailing empty cells and rows are omitted by the service.
    async fn get_values(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SyncError>;

    async fn update_value(
        &self,
        auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
        value: &str,
    ) -> Result<(), SyncError>;
}

fn spreadsheet_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)(?:/|\?|#|$)").ok())
        .as_ref()
}

/// Extracts the spreadsheet id from a `.../spreadsheets/d/<id>/...` URL.
pub fn spreadsheet_id(url: &str) -> Result<String, SyncError> {
    spreadsheet_id_pattern()
        .and_then(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| SyncError::InvalidRequest(format!("invalid spreadsheet url '{url}'")))
}

/// Column letters for a zero-based column index: 0 is `A`, 25 is `Z`, 26 is `AA`.
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Quotes a tab title for use in A1 notation.
pub fn quote_tab(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// A1 range of a single cell; `row` is one-based, `column` zero-based.
pub fn cell_range(tab: &str, column: usize, row: usize) -> String {
    format!("{}!{}{}", quote_tab(tab), column_letter(column), row)
}
