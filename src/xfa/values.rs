//! Field values for datasets mutation.
//!
//! The external collaborator reads a JSON object of `name: value` pairs;
//! values must be JSON primitives. Nested objects and arrays are rejected
//! with a clear error.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A single field value from the input map.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// String value, written verbatim
    Text(String),
    /// Numeric value, serialized in canonical decimal form
    Number(f64),
    /// Boolean, serialized as `true` / `false`
    Bool(bool),
    /// Null, serialized as empty content
    Null,
}

impl FieldValue {
    /// Canonical text form written into the `<value>` element.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FieldValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            FieldValue::Null => String::new(),
        }
    }

    /// Convert a JSON primitive; arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            serde_json::Value::Number(n) => Ok(FieldValue::Number(n.as_f64().unwrap_or(0.0))),
            serde_json::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            serde_json::Value::Null => Ok(FieldValue::Null),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(Error::InvalidPdf(
                "field values must be JSON primitives, not arrays or objects".to_string(),
            )),
        }
    }
}

/// Ordered map of field name to value.
#[derive(Debug, Clone, Default)]
pub struct FieldValueMap {
    entries: BTreeMap<String, FieldValue>,
}

impl FieldValueMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; non-object input and non-primitive
    /// values are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidPdf("field-value map must be a JSON object".to_string())
        })?;

        let mut entries = BTreeMap::new();
        for (name, raw) in object {
            entries.insert(name.clone(), FieldValue::from_json(raw)?);
        }
        Ok(Self { entries })
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.entries.insert(name.into(), value);
    }

    /// Look up a value by field name (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.get(name)
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
