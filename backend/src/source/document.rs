//! Schema-less document model read from the source database.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

/// A single field value of a source document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    /// Database-assigned identifier, kept as its hex text.
    ObjectId(String),
    Array(Vec<FieldValue>),
    Map(Document),
}

impl FieldValue {
    /// JSON rendering used when a structured value is flattened into one cell.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::Number((*i).into()),
            FieldValue::Double(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::DateTime(dt) => Value::String(format_datetime(dt)),
            FieldValue::ObjectId(oid) => Value::String(oid.clone()),
            FieldValue::Array(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Map(doc) => Value::Object(
                doc.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Text written into a spreadsheet cell for this value.
    ///
    /// Scalars keep their plain text, dates use RFC 3339 with milliseconds, and
    /// arrays and maps become compact JSON. `Null` is an empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Double(d) => d.to_string(),
            FieldValue::String(s) => s.clone(),
            FieldValue::DateTime(dt) => format_datetime(dt),
            FieldValue::ObjectId(oid) => oid.clone(),
            FieldValue::Array(_) | FieldValue::Map(_) => self.to_json().to_string(),
        }
    }

    /// Name of the value's type as the source database reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "long",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
            FieldValue::DateTime(_) => "date",
            FieldValue::ObjectId(_) => "objectId",
            FieldValue::Array(_) => "array",
            FieldValue::Map(_) => "object",
        }
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::Array(items.into_iter().map(FieldValue::from).collect()),
            Value::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, FieldValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// An ordered string-keyed map; key order is the order the source returned them in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, FieldValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, keeping its original position when it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key, value))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn structured_values_become_json() {
        let value = FieldValue::from(json!({"city": "Seoul", "tags": [1, "a", null]}));
        assert_eq!(value.to_cell(), r#"{"city":"Seoul","tags":[1,"a",null]}"#);
    }

    #[test]
    fn scalars_keep_plain_text() {
        assert_eq!(FieldValue::Int(42).to_cell(), "42");
        assert_eq!(FieldValue::Double(1.5).to_cell(), "1.5");
        assert_eq!(FieldValue::Bool(false).to_cell(), "false");
        assert_eq!(FieldValue::Null.to_cell(), "");
        assert_eq!(FieldValue::ObjectId("65a1f0".to_string()).to_cell(), "65a1f0");
    }

    #[test]
    fn dates_render_as_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();
        assert_eq!(FieldValue::DateTime(dt).to_cell(), "2024-03-09T12:30:00.000Z");
    }

    #[test]
    fn insert_keeps_first_position() {
        let mut doc = Document::new();
        doc.insert("b", 1);
        doc.insert("a", 2);
        doc.insert("b", 3);
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(doc.get("b"), Some(&FieldValue::Int(3)));
    }
}
