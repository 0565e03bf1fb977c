//! Mirrors one mutation event into the bound spreadsheet.
//!
//! Every event is first turned into a change-log entry, which also guards against
//! re-delivery: an event whose source token the binding already logged, or a tokenless
//! event whose message equals the latest entry for its document, is dropped before any
//! sheet call. Updates are written cell by cell, located by reading the tab's header row
//! and its column A; inserts append one aligned row.

use crate::error::SyncError;
use crate::pipeline::normalize::align_row;
use crate::sheets::{cell_range, quote_tab, spreadsheet_id, OAuthTokens, SheetService};
use crate::source::{Document, FieldValue, MutationEvent, MutationKind};
use crate::store::logs::NewLogEntry;
use crate::store::{SourceBinding, Store};
use common::model::change_log::ALL_COLLECTIONS;
use log::{debug, info, warn};
use std::sync::Arc;

const ID_FIELD: &str = "_id";

/// What [`ChangePropagator::apply`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    /// Already logged for this binding; nothing written.
    Duplicate,
    /// Logged only (sandbox account, delete or other operations).
    Logged,
    /// Logged and written to these A1 ranges.
    CellsUpdated(Vec<String>),
    RowAppended,
    /// Logged, but the document or its fields are not in the sheet.
    Unresolved(String),
}

fn assignments<'a>(fields: impl Iterator<Item = (&'a String, &'a FieldValue)>) -> String {
    fields
        .map(|(key, value)| format!("{key}={}", value.to_cell()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text of the description segment: the source's own description if any, else the field
/// changes of an update (`SET age=5, name=B; UNSET nick`) or the fields written by an
/// insert or replacement, without `_id`.
pub fn describe(event: &MutationEvent) -> Option<String> {
    if let Some(description) = &event.description {
        return Some(description.clone());
    }
    if matches!(event.kind, MutationKind::Insert | MutationKind::Replace) {
        let written = assignments(
            event
                .full_document
                .iter()
                .flat_map(|document| document.iter())
                .filter(|(key, _)| key.as_str() != ID_FIELD),
        );
        return (!written.is_empty()).then(|| format!("SET {written}"));
    }
    let mut parts = Vec::new();
    if !event.updated_fields.is_empty() {
        parts.push(format!("SET {}", assignments(event.updated_fields.iter())));
    }
    if !event.removed_fields.is_empty() {
        parts.push(format!("UNSET {}", event.removed_fields.join(", ")));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

/// `<OPERATION>[ <description>] <documentId> WHERE: <collection>`
pub fn change_message(event: &MutationEvent) -> String {
    let mut message = event.kind.change_kind().as_str().to_string();
    if let Some(description) = describe(event) {
        message.push(' ');
        message.push_str(&description);
    }
    format!(
        "{message} {} WHERE: {}",
        event.document_id.as_deref().unwrap_or("-"),
        event.collection.as_deref().unwrap_or(ALL_COLLECTIONS)
    )
}

#[derive(Clone)]
pub struct ChangePropagator {
    store: Store,
    sheets: Arc<dyn SheetService>,
}

impl ChangePropagator {
    pub fn new(store: Store, sheets: Arc<dyn SheetService>) -> Self {
        Self { store, sheets }
    }

    pub async fn apply(
        &self,
        binding: &SourceBinding,
        event: &MutationEvent,
    ) -> Result<Propagation, SyncError> {
        let entry = NewLogEntry {
            kind: event.kind.change_kind(),
            message: change_message(event),
            collection_name: event
                .collection
                .clone()
                .unwrap_or_else(|| ALL_COLLECTIONS.to_string()),
            document_id: event.document_id.clone(),
            event_token: event.event_token.clone(),
            binding_id: binding.id.clone(),
        };
        let Some(logged) = self.store.append_log_if_new(&entry)? else {
            debug!("binding {}: duplicate '{}'", binding.id, entry.message);
            return Ok(Propagation::Duplicate);
        };
        info!("binding {}: {}", binding.id, logged.message);

        let account = self
            .store
            .account(&binding.account_id)?
            .ok_or_else(|| SyncError::NotFound(format!("account {}", binding.account_id)))?;
        if account.sandbox {
            return Ok(Propagation::Logged);
        }
        let (Some(collection), Some(document_id)) = (&event.collection, &event.document_id)
        else {
            return Ok(Propagation::Logged);
        };

        let target = Target {
            sheets: self.sheets.as_ref(),
            auth: account.tokens(),
            spreadsheet_id: spreadsheet_id(&binding.sheet_url)?,
            tab: collection,
        };
        let outcome = match (&event.kind, &event.full_document) {
            (MutationKind::Update, _) => {
                let mut changes: Vec<(String, String)> = event
                    .updated_fields
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_cell()))
                    .collect();
                changes.extend(
                    event
                        .removed_fields
                        .iter()
                        .map(|key| (key.clone(), String::new())),
                );
                target.update_cells(document_id, &changes).await
            }
            (MutationKind::Replace, Some(document)) => {
                let changes: Vec<(String, String)> = document
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_cell()))
                    .collect();
                target.update_cells(document_id, &changes).await
            }
            (MutationKind::Insert, Some(document)) => target.append_row(document).await,
            _ => Ok(Propagation::Logged),
        };

        match outcome {
            Err(error) if error.is_not_found() => {
                warn!("binding {}: {error}; cell write skipped", binding.id);
                Ok(Propagation::Unresolved(error.to_string()))
            }
            other => other,
        }
    }
}

/// One tab of the bound spreadsheet, as seen by the account's tokens.
struct Target<'a> {
    sheets: &'a dyn SheetService,
    auth: OAuthTokens,
    spreadsheet_id: String,
    tab: &'a str,
}

impl Target<'_> {
    async fn headers(&self) -> Result<Vec<String>, SyncError> {
        let range = format!("{}!1:1", quote_tab(self.tab));
        let rows = self
            .sheets
            .get_values(&self.auth, &self.spreadsheet_id, &range)
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    /// One-based row whose column A equals `document_id`, ignoring the header row.
    async fn row_of(&self, document_id: &str) -> Result<usize, SyncError> {
        let range = format!("{}!A:A", quote_tab(self.tab));
        let column = self
            .sheets
            .get_values(&self.auth, &self.spreadsheet_id, &range)
            .await?;
        column
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, cells)| cells.first().map(String::as_str) == Some(document_id))
            .map(|(index, _)| index + 1)
            .ok_or_else(|| SyncError::NotFound(format!("document {document_id} in '{}'", self.tab)))
    }

    async fn update_cells(
        &self,
        document_id: &str,
        changes: &[(String, String)],
    ) -> Result<Propagation, SyncError> {
        let headers = self.headers().await?;
        let row = self.row_of(document_id).await?;

        let mut ranges = Vec::new();
        for (field, value) in changes {
            let Some(column) = headers.iter().position(|header| header == field) else {
                debug!("'{}' has no column '{field}'", self.tab);
                continue;
            };
            let range = cell_range(self.tab, column, row);
            self.sheets
                .update_value(&self.auth, &self.spreadsheet_id, &range, value)
                .await?;
            ranges.push(range);
        }
        if ranges.is_empty() {
            return Err(SyncError::NotFound(format!(
                "columns for document {document_id} in '{}'",
                self.tab
            )));
        }
        Ok(Propagation::CellsUpdated(ranges))
    }

    async fn append_row(&self, document: &Document) -> Result<Propagation, SyncError> {
        let headers = self.headers().await?;
        if headers.is_empty() {
            return Err(SyncError::NotFound(format!("header row of '{}'", self.tab)));
        }
        let row = align_row(&headers, document);
        let range = format!("{}!A1", quote_tab(self.tab));
        self.sheets
            .append_values(&self.auth, &self.spreadsheet_id, &range, &[row])
            .await?;
        Ok(Propagation::RowAppended)
    }
}
