//! Writes normalized collections into a spreadsheet, one tab per collection.

use super::normalize::NormalizedTable;
use crate::error::SyncError;
use crate::sheets::{quote_tab, OAuthTokens, SheetRequest, SheetService};
use futures_util::future::try_join_all;
use log::{debug, info};
use std::collections::HashMap;

const PROTECTION_DESCRIPTION: &str = "Mirrored from the source database; edit the source instead";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub tab_count: usize,
}

pub struct SheetWriter<'a> {
    sheets: &'a dyn SheetService,
    auth: &'a OAuthTokens,
    protect: bool,
}

impl<'a> SheetWriter<'a> {
    pub fn new(sheets: &'a dyn SheetService, auth: &'a OAuthTokens, protect: bool) -> Self {
        Self {
            sheets,
            auth,
            protect,
        }
    }

    /// Creates one tab per collection, hides the tabs that existed before, then appends
    /// every table (header row first) to its tab.
    ///
    /// Tabs are created in a single batch, so a rejected batch writes no rows. Calling
    /// this twice on the same spreadsheet fails on the duplicate tab titles.
    pub async fn provision_and_write(
        &self,
        spreadsheet_id: &str,
        collection_names: &[String],
        tables: &[NormalizedTable],
    ) -> Result<WriteResult, SyncError> {
        if collection_names.len() != tables.len() {
            return Err(SyncError::ShapeMismatch(format!(
                "{} collection names for {} tables",
                collection_names.len(),
                tables.len()
            )));
        }
        if collection_names.is_empty() {
            info!("spreadsheet {spreadsheet_id}: nothing to write");
            return Ok(WriteResult { tab_count: 0 });
        }

        let existing = self.sheets.list_tabs(self.auth, spreadsheet_id).await?;
        let mut requests: Vec<SheetRequest> = collection_names
            .iter()
            .map(|name| SheetRequest::AddSheet {
                title: name.clone(),
            })
            .collect();
        requests.extend(
            existing
                .iter()
                .map(|tab| SheetRequest::HideSheet {
                    sheet_id: tab.sheet_id,
                }),
        );
        self.sheets
            .batch_update(self.auth, spreadsheet_id, &requests)
            .await?;
        info!(
            "spreadsheet {spreadsheet_id}: added {} tabs, hid {}",
            collection_names.len(),
            existing.len()
        );

        let tab_ids: HashMap<String, i64> = if self.protect {
            self.sheets
                .list_tabs(self.auth, spreadsheet_id)
                .await?
                .into_iter()
                .map(|tab| (tab.title, tab.sheet_id))
                .collect()
        } else {
            HashMap::new()
        };

        try_join_all(collection_names.iter().zip(tables).map(|(name, table)| {
            self.write_collection(spreadsheet_id, name, table, tab_ids.get(name).copied())
        }))
        .await?;

        Ok(WriteResult {
            tab_count: collection_names.len(),
        })
    }

    async fn write_collection(
        &self,
        spreadsheet_id: &str,
        name: &str,
        table: &NormalizedTable,
        tab_id: Option<i64>,
    ) -> Result<(), SyncError> {
        let values = table.to_values();
        if !values.is_empty() {
            let range = format!("{}!A1", quote_tab(name));
            self.sheets
                .append_values(self.auth, spreadsheet_id, &range, &values)
                .await?;
        }
        debug!("spreadsheet {spreadsheet_id}: wrote {} rows to '{name}'", values.len());

        if let Some(sheet_id) = tab_id {
            self.sheets
                .batch_update(
                    self.auth,
                    spreadsheet_id,
                    &[SheetRequest::ProtectSheet {
                        sheet_id,
                        description: PROTECTION_DESCRIPTION.to_string(),
                    }],
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSheets, SheetCall};

    fn tokens() -> OAuthTokens {
        OAuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    fn users_table() -> NormalizedTable {
        NormalizedTable {
            headers: vec!["name".to_string(), "age".to_string()],
            rows: vec![
                vec!["A".to_string(), "1".to_string()],
                vec!["B".to_string(), String::new()],
            ],
        }
    }

    #[tokio::test]
    async fn provisions_tabs_then_appends_rows() {
        let sheets = FakeSheets::with_default_tab("sheet-1");
        let auth = tokens();
        let writer = SheetWriter::new(&sheets, &auth, false);

        let result = writer
            .provision_and_write(
                "sheet-1",
                &["users".to_string(), "empty".to_string()],
                &[users_table(), NormalizedTable::default()],
            )
            .await
            .unwrap();
        assert_eq!(result.tab_count, 2);

        let calls = sheets.calls();
        assert_eq!(
            calls[1],
            SheetCall::BatchUpdate(vec![
                SheetRequest::AddSheet {
                    title: "users".to_string()
                },
                SheetRequest::AddSheet {
                    title: "empty".to_string()
                },
                SheetRequest::HideSheet { sheet_id: 0 },
            ])
        );
        let appends: Vec<_> = calls
            .iter()
            .filter_map(|call| match call {
                SheetCall::Append { range, rows } => Some((range.clone(), rows.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].0, "'users'!A1");
        assert_eq!(appends[0].1[0], vec!["name", "age"]);
        assert_eq!(appends[0].1[2], vec!["B", ""]);
    }

    #[tokio::test]
    async fn protects_each_written_tab() {
        let sheets = FakeSheets::with_default_tab("sheet-1");
        let auth = tokens();
        let writer = SheetWriter::new(&sheets, &auth, true);
        writer
            .provision_and_write("sheet-1", &["users".to_string()], &[users_table()])
            .await
            .unwrap();

        let users_id = sheets.tab_id("sheet-1", "users").unwrap();
        assert!(sheets.calls().iter().any(|call| matches!(
            call,
            SheetCall::BatchUpdate(requests)
                if requests == &vec![SheetRequest::ProtectSheet {
                    sheet_id: users_id,
                    description: PROTECTION_DESCRIPTION.to_string(),
                }]
        )));
    }

    #[tokio::test]
    async fn failed_provisioning_writes_nothing() {
        let sheets = FakeSheets::with_default_tab("sheet-1");
        sheets.fail_batch_updates();
        let auth = tokens();
        let writer = SheetWriter::new(&sheets, &auth, false);

        let err = writer
            .provision_and_write("sheet-1", &["users".to_string()], &[users_table()])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteService { status: 400, .. }));
        assert!(!sheets
            .calls()
            .iter()
            .any(|call| matches!(call, SheetCall::Append { .. })));
    }

    #[tokio::test]
    async fn mismatched_inputs_are_rejected() {
        let sheets = FakeSheets::with_default_tab("sheet-1");
        let auth = tokens();
        let writer = SheetWriter::new(&sheets, &auth, false);
        let err = writer
            .provision_and_write("sheet-1", &["users".to_string()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ShapeMismatch(_)));
        assert!(sheets.calls().is_empty());
    }
}
