//! Access to the document database being mirrored.
//!
//! The pipeline and the watcher only talk to the traits defined here; [`mongo`] is the
//! production implementation.

pub mod document;
pub mod mongo;

use crate::error::SyncError;
use async_trait::async_trait;
use common::model::change_log::ChangeKind;
use futures_util::stream::BoxStream;
use std::fmt;

pub use document::{Document, FieldValue};

/// Where and as whom to connect. `secret` is the decrypted password.
#[derive(Clone)]
pub struct SourceCredentials {
    pub host: String,
    pub principal: String,
    pub secret: String,
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("host", &self.host)
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Replace,
    Delete,
    Other(String),
}

impl MutationKind {
    pub fn change_kind(&self) -> ChangeKind {
        match self {
            MutationKind::Insert => ChangeKind::Insert,
            MutationKind::Update => ChangeKind::Update,
            MutationKind::Replace => ChangeKind::Replace,
            MutationKind::Delete => ChangeKind::Delete,
            MutationKind::Other(name) => ChangeKind::from(name.clone()),
        }
    }
}

/// One notification from a database-wide change subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub kind: MutationKind,
    /// Identity of the event in the source's change history. A re-delivered event carries
    /// the same token; two distinct events never do.
    pub event_token: Option<String>,
    /// Free-form description supplied by the source for some operations.
    pub description: Option<String>,
    /// `None` for database-level operations such as dropping the database.
    pub collection: Option<String>,
    pub document_id: Option<String>,
    /// Fields set by an update, in the order the source reported them.
    pub updated_fields: Document,
    pub removed_fields: Vec<String>,
    /// Full document for inserts and replacements.
    pub full_document: Option<Document>,
}

#[cfg(test)]
impl MutationEvent {
    pub fn new(kind: MutationKind, collection: &str, document_id: &str) -> Self {
        Self {
            kind,
            event_token: None,
            description: None,
            collection: Some(collection.to_string()),
            document_id: Some(document_id.to_string()),
            updated_fields: Document::new(),
            removed_fields: Vec::new(),
            full_document: None,
        }
    }
}

pub type MutationStream = BoxStream<'static, Result<MutationEvent, SyncError>>;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Connectivity check: lists the databases visible to `credentials`.
    async fn list_databases(&self, credentials: &SourceCredentials)
        -> Result<Vec<String>, SyncError>;

    /// Opens a session scoped to one logical database.
    async fn connect(
        &self,
        credentials: &SourceCredentials,
        database: &str,
    ) -> Result<Box<dyn SourceSession>, SyncError>;
}

#[async_trait]
pub trait SourceSession: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>, SyncError>;

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SyncError>;

    /// Subscribes to every mutation in the database.
    async fn watch(&self) -> Result<MutationStream, SyncError>;

    /// Ends the session. Streams returned by `watch` must be dropped first.
    async fn close(&self);
}
