//! Core data types of the execution engine: [`FieldValue`], the
//! insertion-ordered [`Record`], and the normalised [`IndexKey`] used for
//! on-demand materialisation of indexed batch tables.

use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

/// A value in a record field.
///
/// Covers the type set every fluxsql source can produce: integers, floats,
/// booleans, text, null, and nested JSON values (arrays/objects), which are
/// serialised to TEXT when bound into SQLite.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// SQL NULL
    Null,
    /// Nested array (JSON-encoded to text on insertion)
    Array(Vec<FieldValue>),
    /// Nested object (JSON-encoded to text on insertion)
    Struct(HashMap<String, FieldValue>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Array(_) | FieldValue::Struct(_) => {
                write!(f, "{}", self.to_json())
            }
        }
    }
}

impl FieldValue {
    /// Convert a JSON value into a field value. Numbers become Integer when
    /// they fit, Float otherwise.
    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Struct(
                map.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as a JSON value. Whole floats render as integers so that a
    /// value routed through a REAL column round-trips as `2`, not `2.0`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 {
                    serde_json::Value::from(*v as i64)
                } else {
                    serde_json::Value::from(*v)
                }
            }
            FieldValue::String(s) => serde_json::Value::from(s.clone()),
            FieldValue::Boolean(b) => serde_json::Value::from(*b),
            FieldValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Struct(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert to an owned SQLite value for parameter binding. Nested
    /// arrays/objects are JSON-encoded to text.
    pub fn to_sqlite(&self) -> SqliteValue {
        match self {
            FieldValue::Null => SqliteValue::Null,
            FieldValue::Integer(i) => SqliteValue::Integer(*i),
            FieldValue::Float(v) => SqliteValue::Real(*v),
            FieldValue::String(s) => SqliteValue::Text(s.clone()),
            FieldValue::Boolean(b) => SqliteValue::Integer(if *b { 1 } else { 0 }),
            FieldValue::Array(_) | FieldValue::Struct(_) => {
                SqliteValue::Text(self.to_json().to_string())
            }
        }
    }

    /// Convert from a SQLite result cell.
    pub fn from_sqlite(value: ValueRef<'_>) -> FieldValue {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(i) => FieldValue::Integer(i),
            ValueRef::Real(v) => FieldValue::Float(v),
            ValueRef::Text(bytes) => {
                FieldValue::String(String::from_utf8_lossy(bytes).into_owned())
            }
            ValueRef::Blob(bytes) => {
                FieldValue::String(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    /// SQLite column affinity for dynamically created columns:
    /// numeric values get REAL, booleans INTEGER, everything else TEXT.
    pub fn column_affinity(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) | FieldValue::Float(_) => "REAL",
            FieldValue::Boolean(_) => "INTEGER",
            _ => "TEXT",
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// An ordered mapping from attribute name to value.
///
/// Order is the order attributes were produced by the source; it drives
/// both dynamically created column order and output key order. Records are
/// small, so name lookup is a linear scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append or replace the value for an attribute, keeping first-insert order.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Build a record from a JSON object, preserving key order. Returns
    /// None when the value is not an object.
    pub fn from_json_object(value: &serde_json::Value) -> Option<Record> {
        let map = value.as_object()?;
        let mut record = Record::with_capacity(map.len());
        for (key, val) in map {
            record.insert(key.clone(), FieldValue::from_json(val));
        }
        Some(record)
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A record tagged with the streaming source it came from.
#[derive(Debug, Clone)]
pub struct TaggedRecord {
    pub table: String,
    pub record: Record,
}

/// Normalised join key for indexed batch-table materialisation.
///
/// All numeric types collapse to one representation so an integer `1` from
/// a CSV reader and a float `1.0` from a JSON reader hash identically.
/// This is the single numeric-normalisation point in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// Bit pattern of the value as f64
    Number(u64),
    Text(String),
    Boolean(bool),
}

impl IndexKey {
    /// Normalise a field value into a key. Null and nested values produce
    /// no key (they are never indexed or probed).
    pub fn from_field(value: &FieldValue) -> Option<IndexKey> {
        match value {
            FieldValue::Integer(i) => Some(IndexKey::Number((*i as f64).to_bits())),
            FieldValue::Float(v) => Some(IndexKey::Number(v.to_bits())),
            FieldValue::String(s) => Some(IndexKey::Text(s.clone())),
            FieldValue::Boolean(b) => Some(IndexKey::Boolean(*b)),
            FieldValue::Null | FieldValue::Array(_) | FieldValue::Struct(_) => None,
        }
    }
}
