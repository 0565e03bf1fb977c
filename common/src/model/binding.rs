use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a saved binding between a source database and a spreadsheet.
///
/// Credentials never leave the backend, so only connection coordinates are exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSummary {
    pub id: String,
    /// Logical database name; doubles as the project title.
    pub title: String,
    pub host: String,
    pub sheet_url: String,
    pub collection_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// State of the change-subscription loop of one binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchStatus {
    Connecting,
    Active,
    /// The loop could not start; carries the error text.
    Inactive(String),
    Disconnected,
}
