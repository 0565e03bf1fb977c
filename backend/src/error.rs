//! Error type shared by the synchronization pipeline, the watcher and the HTTP layer.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use common::jobs::SyncPhase;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The source database was unreachable or rejected the credentials.
    #[error("source connection failed: {0}")]
    Connection(String),

    #[error("a project for database '{database}' already exists for this account")]
    DuplicateBinding { database: String },

    /// The spreadsheet service rejected a call; carries the provider's error payload.
    #[error("sheet service error {status} ({code}): {message}")]
    RemoteService {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("collection shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid sync phase transition {from} -> {to}")]
    InvalidTransition { from: SyncPhase, to: SyncPhase },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("secret codec: {0}")]
    Secret(String),

    #[error("store: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the error is recovered locally by the watcher instead of stopping it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

impl ResponseError for SyncError {
    fn status_code(&self) -> StatusCode {
        match self {
            SyncError::DuplicateBinding { .. } => StatusCode::CONFLICT,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SyncError::Connection(_) | SyncError::RemoteService { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "message": self.to_string(),
        }))
    }
}
