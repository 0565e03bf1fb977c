//! Turns schema-less collections into rectangular tables.
//!
//! The first document of a collection defines the columns. Later documents are aligned to
//! those columns: missing fields become empty cells and fields the first document lacks are
//! dropped, unless strict mode asks for a `ShapeMismatch` instead.

use crate::error::SyncError;
use crate::source::Document;
use rayon::prelude::*;

/// Every document of one collection, as fetched during a bulk sync.
#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    pub name: String,
    pub documents: Vec<Document>,
}

/// Header row plus data rows; every row is exactly `headers.len()` long.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl NormalizedTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    /// Header row followed by the data rows, the shape appended to a tab.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(self.headers.clone());
        values.extend(self.rows.iter().cloned());
        values
    }
}

/// Cells of `document` in `headers` order; absent fields are empty.
pub fn align_row(headers: &[String], document: &Document) -> Vec<String> {
    headers
        .iter()
        .map(|header| {
            document
                .get(header)
                .map(|value| value.to_cell())
                .unwrap_or_default()
        })
        .collect()
}

pub fn normalize(documents: &[Document]) -> NormalizedTable {
    let Some(first) = documents.first() else {
        return NormalizedTable::default();
    };
    let headers: Vec<String> = first.keys().map(str::to_string).collect();
    let rows = documents
        .iter()
        .map(|document| align_row(&headers, document))
        .collect();
    NormalizedTable { headers, rows }
}

/// Like [`normalize`], but refuses documents carrying fields outside the first
/// document's keys.
pub fn normalize_strict(collection: &str, documents: &[Document]) -> Result<NormalizedTable, SyncError> {
    let table = normalize(documents);
    for (index, document) in documents.iter().enumerate() {
        if let Some(extra) = document
            .keys()
            .find(|key| !table.headers.iter().any(|header| header == key))
        {
            return Err(SyncError::ShapeMismatch(format!(
                "document {index} of '{collection}' has field '{extra}' missing from the header"
            )));
        }
    }
    Ok(table)
}

/// Normalizes independent collections in parallel, keeping their order.
pub fn normalize_collections(
    snapshots: &[CollectionSnapshot],
    strict: bool,
) -> Result<Vec<NormalizedTable>, SyncError> {
    snapshots
        .par_iter()
        .map(|snapshot| {
            if strict {
                normalize_strict(&snapshot.name, &snapshot.documents)
            } else {
                Ok(normalize(&snapshot.documents))
            }
        })
        .collect()
}
