//! MongoDB implementation of the document source.

use super::{
    Document, DocumentSource, FieldValue, MutationEvent, MutationKind, MutationStream,
    SourceCredentials, SourceSession,
};
use crate::error::SyncError;
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use log::{debug, warn};
use mongodb::bson::{doc, Bson, Document as BsonDocument};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};
use mongodb::{Client, Database};

const DEFAULT_SCHEME: &str = "mongodb+srv";

#[derive(Debug, Default, Clone)]
pub struct MongoSource;

#[async_trait]
impl DocumentSource for MongoSource {
    async fn list_databases(
        &self,
        credentials: &SourceCredentials,
    ) -> Result<Vec<String>, SyncError> {
        let client = open_client(&connection_uri(credentials, None)).await?;
        let names = client.list_database_names().await.map_err(connection_error);
        client.shutdown().await;
        names
    }

    async fn connect(
        &self,
        credentials: &SourceCredentials,
        database: &str,
    ) -> Result<Box<dyn SourceSession>, SyncError> {
        let client = open_client(&connection_uri(credentials, Some(database))).await?;
        let db = client.database(database);
        // The driver connects lazily, so ping to surface bad hosts or credentials now.
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;
        debug!("connected to source database {} at {}", database, credentials.host);
        Ok(Box::new(MongoSession { client, db }))
    }
}

struct MongoSession {
    client: Client,
    db: Database,
}

#[async_trait]
impl SourceSession for MongoSession {
    async fn list_collections(&self) -> Result<Vec<String>, SyncError> {
        self.db
            .list_collection_names()
            .await
            .map_err(connection_error)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, SyncError> {
        let cursor = self
            .db
            .collection::<BsonDocument>(collection)
            .find(doc! {})
            .await
            .map_err(connection_error)?;
        let documents: Vec<BsonDocument> = cursor.try_collect().await.map_err(connection_error)?;
        Ok(documents.into_iter().map(from_bson_document).collect())
    }

    async fn watch(&self) -> Result<MutationStream, SyncError> {
        let stream = self.db.watch().await.map_err(connection_error)?;
        Ok(stream
            .map(|item| item.map(mutation_from_event).map_err(connection_error))
            .boxed())
    }

    /// Shuts the client down without waiting for cursors a caller may still hold.
    async fn close(&self) {
        self.client.clone().shutdown().immediate(true).await;
    }
}

async fn open_client(uri: &str) -> Result<Client, SyncError> {
    Client::with_uri_str(uri).await.map_err(connection_error)
}

fn connection_error(error: mongodb::error::Error) -> SyncError {
    SyncError::Connection(error.to_string())
}

/// Builds the connection string for `credentials`, defaulting to an SRV record lookup when
/// the host carries no scheme of its own.
pub(crate) fn connection_uri(credentials: &SourceCredentials, database: Option<&str>) -> String {
    let (scheme, host) = match credentials.host.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => (DEFAULT_SCHEME, credentials.host.as_str()),
    };
    format!(
        "{scheme}://{}:{}@{}/{}?retryWrites=true&w=majority",
        urlencoding::encode(&credentials.principal),
        urlencoding::encode(&credentials.secret),
        host.trim_end_matches('/'),
        database.unwrap_or_default()
    )
}

fn mutation_from_event(event: ChangeStreamEvent<BsonDocument>) -> MutationEvent {
    let kind = match &event.operation_type {
        OperationType::Insert => MutationKind::Insert,
        OperationType::Update => MutationKind::Update,
        OperationType::Replace => MutationKind::Replace,
        OperationType::Delete => MutationKind::Delete,
        OperationType::Other(name) => MutationKind::Other(name.to_ascii_uppercase()),
        other => MutationKind::Other(format!("{other:?}").to_ascii_uppercase()),
    };
    // The resume token is unique per event and stable across re-delivery.
    let event_token = mongodb::bson::to_bson(&event.id)
        .ok()
        .map(|token| token.to_string());
    let document_id = event
        .document_key
        .as_ref()
        .and_then(|key| key.get("_id"))
        .map(|id| from_bson(id.clone()).to_cell());
    if document_id.is_none() {
        warn!("change event {:?} carries no document key", kind);
    }
    let (updated_fields, removed_fields) = match event.update_description {
        Some(description) => (
            from_bson_document(description.updated_fields),
            description.removed_fields,
        ),
        None => (Document::new(), Vec::new()),
    };

    MutationEvent {
        kind,
        event_token,
        description: None,
        collection: event.ns.and_then(|ns| ns.coll),
        document_id,
        updated_fields,
        removed_fields,
        full_document: event.full_document.map(from_bson_document),
    }
}

fn from_bson_document(document: BsonDocument) -> Document {
    document
        .into_iter()
        .map(|(key, value)| (key, from_bson(value)))
        .collect()
}

fn from_bson(value: Bson) -> FieldValue {
    match value {
        Bson::Null | Bson::Undefined => FieldValue::Null,
        Bson::Boolean(b) => FieldValue::Bool(b),
        Bson::Int32(i) => FieldValue::Int(i.into()),
        Bson::Int64(i) => FieldValue::Int(i),
        Bson::Double(d) => FieldValue::Double(d),
        Bson::String(s) => FieldValue::String(s),
        Bson::ObjectId(oid) => FieldValue::ObjectId(oid.to_hex()),
        Bson::DateTime(dt) => chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
            .map(FieldValue::DateTime)
            .unwrap_or(FieldValue::Null),
        Bson::Array(items) => FieldValue::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(document) => FieldValue::Map(from_bson_document(document)),
        other => FieldValue::String(other.to_string()),
    }
}
