//! Loosely-typed remote documents and write descriptors.

use serde_json::Value;

/// A raw remote document: an untrusted field map. Consumers validate field
/// types when projecting into domain records.
pub type Document = serde_json::Map<String, Value>;

/// One field of a write.
#[derive(Debug, Clone)]
pub enum WriteField {
    /// Plain value; replaces the field.
    Value(Value),
    /// Resolved to the store's current time (epoch milliseconds) at commit.
    ServerTimestamp,
    /// Set-union append: items not already present are appended to the
    /// existing array. A missing or non-array field becomes a fresh array.
    /// Re-applying the same union is a no-op.
    ArrayUnion(Vec<Value>),
    /// One level of nested fields, merged into an existing map field.
    Map(Vec<(String, WriteField)>),
}

/// Ordered field set for a single write.
#[derive(Debug, Clone, Default)]
pub struct Fields(Vec<(String, WriteField)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((key.into(), WriteField::Value(value.into())));
        self
    }

    pub fn server_timestamp(mut self, key: impl Into<String>) -> Self {
        self.0.push((key.into(), WriteField::ServerTimestamp));
        self
    }

    pub fn array_union(mut self, key: impl Into<String>, items: Vec<Value>) -> Self {
        self.0.push((key.into(), WriteField::ArrayUnion(items)));
        self
    }

    pub fn map(mut self, key: impl Into<String>, nested: Fields) -> Self {
        self.0.push((key.into(), WriteField::Map(nested.0)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, WriteField)> {
        self.0.iter()
    }
}

/// Apply one write field to a document, resolving server-side values.
pub(crate) fn apply_field(doc: &mut Document, key: &str, field: &WriteField, now_ms: i64) {
    match field {
        WriteField::Value(value) => {
            doc.insert(key.to_string(), value.clone());
        }
        WriteField::ServerTimestamp => {
            doc.insert(key.to_string(), Value::from(now_ms));
        }
        WriteField::ArrayUnion(items) => {
            if !matches!(doc.get(key), Some(Value::Array(_))) {
                doc.insert(key.to_string(), Value::Array(Vec::new()));
            }
            if let Some(Value::Array(existing)) = doc.get_mut(key) {
                for item in items {
                    if !existing.contains(item) {
                        existing.push(item.clone());
                    }
                }
            }
        }
        WriteField::Map(nested) => {
            if !matches!(doc.get(key), Some(Value::Object(_))) {
                doc.insert(key.to_string(), Value::Object(Document::new()));
            }
            if let Some(Value::Object(existing)) = doc.get_mut(key) {
                for (nested_key, nested_field) in nested {
                    apply_field(existing, nested_key, nested_field, now_ms);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_union_is_idempotent() {
        let mut doc = Document::new();
        let union = WriteField::ArrayUnion(vec![json!("u1")]);
        apply_field(&mut doc, "readBy", &union, 0);
        apply_field(&mut doc, "readBy", &union, 0);
        assert_eq!(doc.get("readBy"), Some(&json!(["u1"])));

        apply_field(&mut doc, "readBy", &WriteField::ArrayUnion(vec![json!("u2")]), 0);
        assert_eq!(doc.get("readBy"), Some(&json!(["u1", "u2"])));
    }

    #[test]
    fn server_timestamp_resolves_to_commit_time() {
        let mut doc = Document::new();
        apply_field(&mut doc, "updatedAt", &WriteField::ServerTimestamp, 1_700_000_000_000);
        assert_eq!(doc.get("updatedAt"), Some(&json!(1_700_000_000_000i64)));
    }

    #[test]
    fn nested_map_merges_into_existing_field() {
        let mut doc = Document::new();
        doc.insert("lastMessage".into(), json!({ "text": "old", "senderId": "u1" }));

        let nested = WriteField::Map(vec![("text".into(), WriteField::Value(json!("new")))]);
        apply_field(&mut doc, "lastMessage", &nested, 0);

        assert_eq!(
            doc.get("lastMessage"),
            Some(&json!({ "text": "new", "senderId": "u1" }))
        );
    }
}
