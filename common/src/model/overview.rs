use serde::{Deserialize, Serialize};

/// Value types seen for one field across a collection, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTypes {
    pub field: String,
    pub types: Vec<String>,
}

/// Every field of one source collection with the types it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub collection: String,
    pub fields: Vec<FieldTypes>,
}

/// The first rows of a collection, shaped as they are written to its tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPreview {
    pub collection: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Number of documents in the collection, of which `rows` is a prefix.
    pub total_rows: usize,
}
