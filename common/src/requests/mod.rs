use crate::jobs::SyncPhase;
use crate::model::binding::{BindingSummary, WatchStatus};
use crate::model::change_log::ChangeLogEntry;
use crate::model::overview::{CollectionPreview, CollectionSchema};
use serde::{Deserialize, Serialize};

/// Sheet URL sentinel asking the service to create a fresh spreadsheet.
pub const AUTO_GENERATE_SHEET_URL: &str = "https://www.AUTO_GENERATE.com";

/// Request payload for starting a bulk synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizeRequest {
    pub db_url: String,
    pub db_id: String,
    pub db_password: String,
    /// Name of the source database to mirror.
    pub db_table_name: String,
    /// Destination spreadsheet URL or [`AUTO_GENERATE_SHEET_URL`].
    pub sheet_url: String,
}

/// Request payload for the source connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateDbRequest {
    pub db_url: String,
    pub db_id: String,
    pub db_password: String,
}

/// Query string of the status polling endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStartedResponse {
    pub success: bool,
    pub task_id: String,
}

/// `status` is `None` while the task is unknown or not started yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub success: bool,
    pub status: Option<SyncPhase>,
}

/// Request payload for the destination connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSheetRequest {
    pub sheet_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateDbResponse {
    pub success: bool,
    pub message: String,
    pub database_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSheetResponse {
    pub success: bool,
    pub message: String,
    /// Titles of the tabs the spreadsheet currently holds.
    pub sheet_titles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub success: bool,
    pub project: BindingSummary,
    /// `None` when no watcher is registered for the project.
    pub watch_status: Option<WatchStatus>,
    pub schema: Vec<CollectionSchema>,
    pub data_preview: Vec<CollectionPreview>,
    /// Why `schema` and `data_preview` are empty when the source could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsResponse {
    pub success: bool,
    pub projects_length: usize,
    pub projects: Vec<BindingSummary>,
}

/// Change-log entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<ChangeLogEntry>,
}

/// Token pair handed over by the auth layer after an OAuth login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRequest {
    #[serde(default)]
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Sandbox accounts are logged but never written to.
    #[serde(default)]
    pub sandbox: bool,
}
