//! Record definitions
//!
//! A record is a string key plus an open map of string fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields every record carries once created, filled with `""` when omitted
pub const DEFAULT_FIELDS: [&str; 11] = [
    "cp",
    "CUIT",
    "domicilio",
    "idreq",
    "idSeq",
    "localidad",
    "provincia",
    "sede",
    "seqID",
    "telefono",
    "web",
];

/// Key under which the record id appears in its JSON form
pub const ID_FIELD: &str = "id";

/// A stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique key
    pub id: String,

    /// Named string fields, ordered by name
    pub fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record with the given fields and no defaults applied
    pub fn new(id: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Create a new record: supplied fields plus every missing default field
    pub fn create(id: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        let mut record = Self::new(id, fields);
        record.ensure_defaults();
        record
    }

    /// Fill in any canonical field the record does not have yet
    pub fn ensure_defaults(&mut self) {
        for field in DEFAULT_FIELDS {
            self.fields
                .entry(field.to_string())
                .or_insert_with(String::new);
        }
    }

    /// Merge supplied fields: present fields overwrite, absent ones are kept
    pub fn merge(&mut self, fields: BTreeMap<String, String>) {
        self.fields.extend(fields);
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Wire form: `{"id": ..., <field>: <value>, ...}`
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        for (name, value) in &self.fields {
            map.insert(name.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }

    /// Parse the wire form back into a record
    ///
    /// Returns `None` if the value is not an object or has no string `id`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let id = object.get(ID_FIELD)?.as_str()?.to_string();
        let fields = object
            .iter()
            .filter(|(name, _)| name.as_str() != ID_FIELD)
            .map(|(name, value)| (name.clone(), field_text(value)))
            .collect();
        Some(Self { id, fields })
    }
}

/// Text stored for a JSON field value
///
/// Strings are stored as-is, `null` as `""`, everything else as its JSON text.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
