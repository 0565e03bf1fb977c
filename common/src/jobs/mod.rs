use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progress of one bulk synchronization run.
///
/// The successful path is strictly ordered:
/// `Connected -> Fetched -> Formatted -> Transferred`. `Failed` is terminal and can be
/// reached from any phase except `Transferred`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    /// The source database accepted the connection.
    Connected,
    /// Every collection has been read into memory.
    Fetched,
    /// Every collection has been normalized into a table.
    Formatted,
    /// All tables were written to the destination spreadsheet.
    Transferred,
    /// The run stopped before reaching `Transferred`.
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Connected => "CONNECTED",
            SyncPhase::Fetched => "FETCHED",
            SyncPhase::Formatted => "FORMATTED",
            SyncPhase::Transferred => "TRANSFERRED",
            SyncPhase::Failed => "FAILED",
        }
    }

    /// The phase that must follow this one on the successful path.
    pub fn successor(&self) -> Option<SyncPhase> {
        match self {
            SyncPhase::Connected => Some(SyncPhase::Fetched),
            SyncPhase::Fetched => Some(SyncPhase::Formatted),
            SyncPhase::Formatted => Some(SyncPhase::Transferred),
            SyncPhase::Transferred | SyncPhase::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Transferred | SyncPhase::Failed)
    }

    /// Whether a task sitting in `self` may move to `next`.
    ///
    /// Skipping a phase is never allowed, so `Fetched -> Transferred` is rejected.
    pub fn can_advance_to(&self, next: SyncPhase) -> bool {
        if next == SyncPhase::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPhase(pub String);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sync phase '{}'", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl FromStr for SyncPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECTED" => Ok(SyncPhase::Connected),
            "FETCHED" => Ok(SyncPhase::Fetched),
            "FORMATTED" => Ok(SyncPhase::Formatted),
            "TRANSFERRED" => Ok(SyncPhase::Transferred),
            "FAILED" => Ok(SyncPhase::Failed),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}
