//! Prepared documents handed to search backends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A flat map of field names to prepared values.
///
/// Null values are never stored: a field that prepared to null is simply
/// absent from the document, which is what existence queries test for.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document::default()
    }

    /// Add a field value. Null values are dropped.
    pub fn add_field<S: Into<String>>(&mut self, name: S, value: Value) {
        if !value.is_null() {
            self.fields.insert(name.into(), value);
        }
    }

    /// Add a field value, builder style.
    pub fn with_field<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.add_field(name, value.into());
        self
    }

    /// Get a field value from the document.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Check if the document has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Get all field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Get all field values.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_fields_are_dropped() {
        let doc = Document::new()
            .with_field("author", "daniel1")
            .with_field("foo", Value::Null);
        assert!(doc.has_field("author"));
        assert!(!doc.has_field("foo"));
        assert_eq!(doc.field_names(), vec!["author"]);
        assert_eq!(doc.len(), 1);
    }
}
