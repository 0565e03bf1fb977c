//! Read-only overview of a bound source database: which fields each collection carries,
//! with their types, and how its first rows will look in the spreadsheet.

use super::normalize::{normalize, CollectionSnapshot};
use common::model::overview::{CollectionPreview, CollectionSchema, FieldTypes};
use rayon::prelude::*;

/// Rows shown per collection in a preview.
pub const PREVIEW_ROWS: usize = 5;

/// Every field seen in any document of the collection, in first-seen order, with its types.
pub fn collection_schema(snapshot: &CollectionSnapshot) -> CollectionSchema {
    let mut fields: Vec<FieldTypes> = Vec::new();
    for (key, value) in snapshot.documents.iter().flat_map(|document| document.iter()) {
        let type_name = value.type_name();
        match fields.iter_mut().find(|field| &field.field == key) {
            Some(field) => {
                if !field.types.iter().any(|seen| seen == type_name) {
                    field.types.push(type_name.to_string());
                }
            }
            None => fields.push(FieldTypes {
                field: key.clone(),
                types: vec![type_name.to_string()],
            }),
        }
    }
    CollectionSchema {
        collection: snapshot.name.clone(),
        fields,
    }
}

/// The first `limit` rows of the collection, normalized the same way a sync writes them.
pub fn collection_preview(snapshot: &CollectionSnapshot, limit: usize) -> CollectionPreview {
    let head = &snapshot.documents[..snapshot.documents.len().min(limit)];
    let table = normalize(head);
    CollectionPreview {
        collection: snapshot.name.clone(),
        headers: table.headers,
        rows: table.rows,
        total_rows: snapshot.documents.len(),
    }
}

/// Schema and preview of every collection, in snapshot order.
pub fn overview(snapshots: &[CollectionSnapshot]) -> (Vec<CollectionSchema>, Vec<CollectionPreview>) {
    snapshots
        .par_iter()
        .map(|snapshot| {
            (
                collection_schema(snapshot),
                collection_preview(snapshot, PREVIEW_ROWS),
            )
        })
        .unzip()
}
