use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection name recorded for entries that are not tied to one collection.
pub const ALL_COLLECTIONS: &str = "all";

/// Kind of change recorded in the change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeKind {
    /// A binding was created by a bulk synchronization.
    Create,
    Insert,
    Update,
    Replace,
    Delete,
    /// Any other operation reported by the source (drop, rename, ...), upper-cased.
    Other(String),
}

impl ChangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeKind::Create => "CREATE",
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Replace => "REPLACE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ChangeKind {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "CREATE" => ChangeKind::Create,
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "REPLACE" => ChangeKind::Replace,
            "DELETE" => ChangeKind::Delete,
            other => ChangeKind::Other(other.to_string()),
        }
    }
}

impl From<ChangeKind> for String {
    fn from(value: ChangeKind) -> Self {
        value.as_str().to_string()
    }
}

/// One append-only audit record.
///
/// The `message` of a mutation entry is also its dedup key within a binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub kind: ChangeKind,
    pub message: String,
    pub collection_name: String,
    pub document_id: Option<String>,
    pub binding_id: String,
    pub created_at: DateTime<Utc>,
}
