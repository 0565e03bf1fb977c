//! In-process fakes of the source database and the sheet service.

use crate::error::SyncError;
use crate::sheets::{CreatedSpreadsheet, OAuthTokens, SheetRequest, SheetService, SheetTab};
use crate::source::{
    Document, DocumentSource, MutationEvent, MutationStream, SourceCredentials, SourceSession,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum SheetCall {
    Create { title: String },
    ListTabs,
    BatchUpdate(Vec<SheetRequest>),
    Append { range: String, rows: Vec<Vec<String>> },
    Get { range: String },
    Update { range: String, value: String },
}

struct FakeTab {
    id: i64,
    title: String,
    values: Vec<Vec<String>>,
}

#[derive(Default)]
struct SheetState {
    spreadsheets: HashMap<String, Vec<FakeTab>>,
    calls: Vec<SheetCall>,
    fail_batch: bool,
    next_tab_id: i64,
    created: usize,
}

#[derive(Default)]
pub struct FakeSheets {
    state: Mutex<SheetState>,
}

fn remote(status: u16, code: &str, message: &str) -> SyncError {
    SyncError::RemoteService {
        status,
        code: code.to_string(),
        message: message.to_string(),
    }
}

/// Splits `'tab'!A1` into the unquoted tab title and the cell part.
fn split_range(range: &str) -> (String, String) {
    let (tab, cells) = range.split_once('!').unwrap_or((range, ""));
    let tab = tab
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(tab)
        .replace("''", "'");
    (tab, cells.to_string())
}

/// Parses `B3` into zero-based column and one-based row.
fn parse_cell(cell: &str) -> Option<(usize, usize)> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let row: usize = cell[letters.len()..].parse().ok()?;
    let column = letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A' + 1) as usize);
    Some((column.checked_sub(1)?, row))
}

impl FakeSheets {
    /// A service holding one spreadsheet `id` with its default tab `Sheet1` (id 0).
    pub fn with_default_tab(id: &str) -> Self {
        let sheets = FakeSheets::default();
        {
            let mut state = sheets.state.lock().unwrap();
            state.next_tab_id = 100;
            state.spreadsheets.insert(
                id.to_string(),
                vec![FakeTab {
                    id: 0,
                    title: "Sheet1".to_string(),
                    values: Vec::new(),
                }],
            );
        }
        sheets
    }

    pub fn seed_tab(&self, spreadsheet_id: &str, title: &str, values: Vec<Vec<&str>>) {
        let mut state = self.state.lock().unwrap();
        state.next_tab_id += 1;
        let id = state.next_tab_id;
        state
            .spreadsheets
            .entry(spreadsheet_id.to_string())
            .or_default()
            .push(FakeTab {
                id,
                title: title.to_string(),
                values: values
                    .into_iter()
                    .map(|row| row.into_iter().map(str::to_string).collect())
                    .collect(),
            });
    }

    pub fn fail_batch_updates(&self) {
        self.state.lock().unwrap().fail_batch = true;
    }

    pub fn calls(&self) -> Vec<SheetCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SheetCall::Update { range, value } => Some((range, value)),
                _ => None,
            })
            .collect()
    }

    pub fn tab_id(&self, spreadsheet_id: &str, title: &str) -> Option<i64> {
        let state = self.state.lock().unwrap();
        state
            .spreadsheets
            .get(spreadsheet_id)?
            .iter()
            .find(|tab| tab.title == title)
            .map(|tab| tab.id)
    }

    pub fn tab_values(&self, spreadsheet_id: &str, title: &str) -> Vec<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .spreadsheets
            .get(spreadsheet_id)
            .and_then(|tabs| tabs.iter().find(|tab| tab.title == title))
            .map(|tab| tab.values.clone())
            .unwrap_or_default()
    }
}

fn tab_mut<'a>(
    state: &'a mut SheetState,
    spreadsheet_id: &str,
    title: &str,
) -> Result<&'a mut FakeTab, SyncError> {
    state
        .spreadsheets
        .get_mut(spreadsheet_id)
        .ok_or_else(|| remote(404, "NOT_FOUND", "Requested entity was not found."))?
        .iter_mut()
        .find(|tab| tab.title == title)
        .ok_or_else(|| remote(400, "INVALID_ARGUMENT", "Unable to parse range"))
}

#[async_trait]
impl SheetService for FakeSheets {
    async fn create_spreadsheet(
        &self,
        _auth: &OAuthTokens,
        title: &str,
    ) -> Result<CreatedSpreadsheet, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Create {
            title: title.to_string(),
        });
        state.created += 1;
        let id = format!("generated-{}", state.created);
        state.spreadsheets.insert(
            id.clone(),
            vec![FakeTab {
                id: 0,
                title: "Sheet1".to_string(),
                values: Vec::new(),
            }],
        );
        Ok(CreatedSpreadsheet {
            url: format!("https://docs.google.com/spreadsheets/d/{id}/edit"),
            spreadsheet_id: id,
        })
    }

    async fn list_tabs(
        &self,
        _auth: &OAuthTokens,
        spreadsheet_id: &str,
    ) -> Result<Vec<SheetTab>, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::ListTabs);
        let tabs = state
            .spreadsheets
            .get(spreadsheet_id)
            .ok_or_else(|| remote(404, "NOT_FOUND", "Requested entity was not found."))?;
        Ok(tabs
            .iter()
            .map(|tab| SheetTab {
                sheet_id: tab.id,
                title: tab.title.clone(),
            })
            .collect())
    }

    async fn batch_update(
        &self,
        _auth: &OAuthTokens,
        spreadsheet_id: &str,
        requests: &[SheetRequest],
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::BatchUpdate(requests.to_vec()));
        if state.fail_batch {
            return Err(remote(400, "INVALID_ARGUMENT", "batch rejected"));
        }
        let mut next_id = state.next_tab_id;
        let tabs = state
            .spreadsheets
            .get_mut(spreadsheet_id)
            .ok_or_else(|| remote(404, "NOT_FOUND", "Requested entity was not found."))?;
        for request in requests {
            if let SheetRequest::AddSheet { title } = request {
                if tabs.iter().any(|tab| &tab.title == title) {
                    return Err(remote(400, "INVALID_ARGUMENT", "duplicate sheet name"));
                }
            }
        }
        for request in requests {
            if let SheetRequest::AddSheet { title } = request {
                next_id += 1;
                tabs.push(FakeTab {
                    id: next_id,
                    title: title.clone(),
                    values: Vec::new(),
                });
            }
        }
        state.next_tab_id = next_id;
        Ok(())
    }

    async fn append_values(
        &self,
        _auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Append {
            range: range.to_string(),
            rows: rows.to_vec(),
        });
        let (title, _) = split_range(range);
        tab_mut(&mut state, spreadsheet_id, &title)?
            .values
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn get_values(
        &self,
        _auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Get {
            range: range.to_string(),
        });
        let (title, cells) = split_range(range);
        let tab = tab_mut(&mut state, spreadsheet_id, &title)?;
        Ok(match cells.as_str() {
            "1:1" => tab.values.iter().take(1).cloned().collect(),
            "A:A" => tab
                .values
                .iter()
                .map(|row| row.iter().take(1).cloned().collect())
                .collect(),
            _ => tab.values.clone(),
        })
    }

    async fn update_value(
        &self,
        _auth: &OAuthTokens,
        spreadsheet_id: &str,
        range: &str,
        value: &str,
    ) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SheetCall::Update {
            range: range.to_string(),
            value: value.to_string(),
        });
        let (title, cell) = split_range(range);
        let (column, row) =
            parse_cell(&cell).ok_or_else(|| remote(400, "INVALID_ARGUMENT", "bad cell"))?;
        let tab = tab_mut(&mut state, spreadsheet_id, &title)?;
        if tab.values.len() < row {
            tab.values.resize(row, Vec::new());
        }
        let cells = &mut tab.values[row - 1];
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.to_string();
        Ok(())
    }
}

#[derive(Default)]
struct SourceState {
    databases: HashMap<String, Vec<(String, Vec<Document>)>>,
    events: Option<mpsc::UnboundedReceiver<MutationEvent>>,
}

/// A document source serving fixed collections and a scripted change stream.
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
    sender: Mutex<Option<mpsc::UnboundedSender<MutationEvent>>>,
    fail_connect: AtomicBool,
    stalled_hosts: Mutex<HashSet<String>>,
    fail_fetch: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(SourceState {
                databases: HashMap::new(),
                events: Some(receiver),
            })),
            sender: Mutex::new(Some(sender)),
            fail_connect: AtomicBool::new(false),
            stalled_hosts: Mutex::new(HashSet::new()),
            fail_fetch: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_collection(self, database: &str, collection: &str, documents: Vec<Document>) -> Self {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(database.to_string())
            .or_default()
            .push((collection.to_string(), documents));
        self
    }

    /// Sender feeding the change stream returned by the first `watch` call.
    pub fn events(&self) -> mpsc::UnboundedSender<MutationEvent> {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => sender.clone(),
            None => mpsc::unbounded_channel().0,
        }
    }

    /// Drops the held sender so the stream ends once every outside sender is gone.
    pub fn end_events(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn fail_connections(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Connections to `host` never complete.
    pub fn stall_connections_to(&self, host: &str) {
        self.stalled_hosts.lock().unwrap().insert(host.to_string());
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn closed_sessions(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for FakeSource {
    async fn list_databases(
        &self,
        _credentials: &SourceCredentials,
    ) -> Result<Vec<String>, SyncError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SyncError::Connection("connection refused".to_string()));
        }
        let mut names: Vec<String> = self.state.lock().unwrap().databases.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn connect(
        &self,
        credentials: &SourceCredentials,
        database: &str,
    ) -> Result<Box<dyn SourceSession>, SyncError> {
        // A network round trip: lets concurrent callers interleave.
        tokio::task::yield_now().await;
        let stalled = self.stalled_hosts.lock().unwrap().contains(&credentials.host);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SyncError::Connection("connection refused".to_string()));
        }
        Ok(Box::new(FakeSession {
            database: database.to_string(),
            state: Arc::clone(&self.state),
            fail_fetch: Arc::clone(&self.fail_fetch),
            closed: Arc::clone(&self.closed),
            stream: Mutex::new(None),
        }))
    }
}

struct FakeSession {
    database: String,
    state: Arc<Mutex<SourceState>>,
    fail_fetch: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
    /// Alive while a stream returned by `watch` is.
    stream: Mutex<Option<Weak<()>>>,
}

impl FakeSession {
    fn stream_alive(&self) -> bool {
        self.stream
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|alive| alive.strong_count() > 0)
    }
}

#[async_trait]
impl SourceSession for FakeSession {
    async fn list_collections(&self) -> Result<Vec<String>, SyncError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .databases
            .get(&self.database)
            .map(|collections| collections.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SyncError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(SyncError::Connection("cursor killed".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .databases
            .get(&self.database)
            .and_then(|collections| collections.iter().find(|(name, _)| name == collection))
            .map(|(_, documents)| documents.clone())
            .unwrap_or_default())
    }

    async fn watch(&self) -> Result<MutationStream, SyncError> {
        let receiver = self.state.lock().unwrap().events.take();
        let alive = Arc::new(());
        *self.stream.lock().unwrap() = Some(Arc::downgrade(&alive));
        Ok(match receiver {
            Some(receiver) => stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|event| (Ok(event), receiver))
            })
            // Held until the stream itself is dropped, even after it ends.
            .map(move |item| {
                let _held = &alive;
                item
            })
            .boxed(),
            None => stream::empty().boxed(),
        })
    }

    /// Like a real client shutdown, waits until every stream of the session is dropped.
    async fn close(&self) {
        while self.stream_alive() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
