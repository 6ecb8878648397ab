//! Measurement records
//!
//! A [`Point`] is a measurement name plus an ordered tag set and a non-empty
//! field set. Timestamps are not part of the point; the encoder captures
//! them at serialization time.

use std::fmt;

use crate::error::{ProtoError, Result};

/// Field value type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    UInteger(u64),
    String(String),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Integer(v) => write!(f, "{v}i"),
            FieldValue::UInteger(v) => write!(f, "{v}u"),
            FieldValue::String(v) => {
                f.write_str("\"")?;
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            },
            FieldValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInteger(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Insertion-ordered key/value set
///
/// Keys are unique: inserting an existing key replaces its value in place,
/// so the first occurrence keeps its position in the encoded line.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedSet<V> {
    entries: Vec<(String, V)>,
}

/// Tag set: key -> string value
pub type TagSet = KeyedSet<String>;

/// Field set: key -> typed value
pub type FieldSet = KeyedSet<FieldValue>;

impl<V> Default for KeyedSet<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> KeyedSet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<V>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K, V, T> FromIterator<(K, T)> for KeyedSet<V>
where
    K: Into<String>,
    T: Into<V>,
{
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

/// A single measurement record
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: TagSet,
    fields: FieldSet,
}

impl Point {
    /// Free-form construction from an already parsed field set
    pub fn new(measurement: impl Into<String>, tags: TagSet, fields: FieldSet) -> Result<Self> {
        let measurement = measurement.into();
        if measurement.trim().is_empty() {
            return Err(ProtoError::EmptyMeasurement);
        }
        if fields.is_empty() {
            return Err(ProtoError::EmptyFieldSet);
        }
        if fields.keys().any(|k| k.trim().is_empty()) {
            return Err(ProtoError::EmptyFieldKey);
        }

        Ok(Self {
            measurement,
            tags,
            fields,
        })
    }

    /// Single float field point
    ///
    /// `value` must parse as a finite decimal number; NaN and infinities
    /// are rejected rather than coerced.
    pub fn float(
        measurement: impl Into<String>,
        tags: TagSet,
        field: impl Into<String>,
        value: &str,
    ) -> Result<Self> {
        let field = field.into();
        let number = parse_finite(&field, value)?;
        Self::single(measurement, tags, field, FieldValue::Float(number))
    }

    /// Single string field point; the value is kept verbatim
    pub fn string(
        measurement: impl Into<String>,
        tags: TagSet,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        Self::single(measurement, tags, field, FieldValue::String(value.into()))
    }

    /// Single boolean field point
    pub fn boolean(
        measurement: impl Into<String>,
        tags: TagSet,
        field: impl Into<String>,
        value: bool,
    ) -> Result<Self> {
        Self::single(measurement, tags, field, FieldValue::Bool(value))
    }

    fn single(
        measurement: impl Into<String>,
        tags: TagSet,
        field: impl Into<String>,
        value: FieldValue,
    ) -> Result<Self> {
        let mut fields = FieldSet::new();
        fields.insert(field, value);
        Self::new(measurement, tags, fields)
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

/// Renders `measurement[,tags] fields` without the timestamp
///
/// Tags with an empty value are skipped: the line protocol cannot carry them.
impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.measurement)?;

        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            write!(f, ",{key}={value}")?;
        }

        f.write_str(" ")?;
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }

        Ok(())
    }
}

pub(crate) fn parse_finite(field: &str, value: &str) -> Result<f64> {
    let invalid = || ProtoError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    };

    let number: f64 = value.trim().parse().map_err(|_| invalid())?;
    if !number.is_finite() {
        return Err(invalid());
    }
    Ok(number)
}
