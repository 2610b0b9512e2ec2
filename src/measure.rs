//! The record model carried by every measure stream.
//!
//! A [`Measure`] is a named, timestamped record with an ordered list of
//! [`Tag`]s (the indexed dimensions) and an ordered list of [`Field`]s (the
//! payload). Fields carry a typed [`FieldValue`]; parsing from raw strings is
//! lenient and degrades to a zero value of the requested type instead of
//! failing.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// The single unit of data passed between stages
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Event time in nanoseconds
    pub time: i64,
}

impl Measure {
    pub fn new(name: impl Into<String>, time: i64) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            time,
        }
    }

    pub fn with_tag(mut self, name: impl Into<String>, data: impl Into<String>) -> Self {
        self.tags.push(Tag::new(name, data));
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// First field with the given name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_value(&self, name: &str) -> Option<&FieldValue> {
        self.field(name).map(|f| &f.value)
    }

    /// First tag with the given name
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tag(name).map(|t| t.data.as_str())
    }

    /// SHA-256 over the concatenated tag values, in tag order
    pub fn sha256(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for tag in &self.tags {
            hasher.update(tag.data.as_bytes());
        }
        hasher.finalize().into()
    }

    /// BLAKE3 over the concatenated tag values, in tag order
    pub fn blake3(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for tag in &self.tags {
            hasher.update(tag.data.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

/// Indexed portion of a measure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub data: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Type of a field's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Nil,
}

impl FieldType {
    /// Map a type token to a field type. Unknown tokens are treated as strings.
    pub fn parse(token: &str) -> Self {
        match token {
            "string" | "s" | "text" => FieldType::String,
            "int" | "i" | "integer" => FieldType::Int,
            "uint" | "u" | "unsigned" => FieldType::Uint,
            "float" | "f" | "number" => FieldType::Float,
            "bool" | "b" | "boolean" => FieldType::Bool,
            "nil" | "n" | "null" => FieldType::Nil,
            _ => FieldType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Uint => "uint",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Nil => "nil",
        };
        f.write_str(name)
    }
}

/// Typed field data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Nil,
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Uint(_) => FieldType::Uint,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Nil => FieldType::Nil,
        }
    }

    /// Coerce a raw string into a value of the given type.
    ///
    /// Coercion never fails: unparsable numbers become `0` (or `NaN` for
    /// floats) and unparsable booleans become `false`.
    pub fn parse(kind: FieldType, raw: &str) -> Self {
        match kind {
            FieldType::Float => FieldValue::Float(raw.parse().unwrap_or(f64::NAN)),
            FieldType::Uint => FieldValue::Uint(raw.parse().unwrap_or(0)),
            FieldType::Int => FieldValue::Int(raw.parse().unwrap_or(0)),
            FieldType::Bool => FieldValue::Bool(parse_bool(raw)),
            FieldType::String => FieldValue::String(raw.to_string()),
            FieldType::Nil => FieldValue::Nil,
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

/// Non-indexed portion of a measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn nil(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Nil,
        }
    }

    /// Build a field from raw strings: a name, a type token and the data
    pub fn parse(name: &str, kind: &str, raw: &str) -> Self {
        let kind = FieldType::parse(kind);
        Self {
            name: name.to_string(),
            value: FieldValue::parse(kind, raw),
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.value.field_type()
    }

    /// Order two fields of the same type.
    ///
    /// Floats that are unordered (NaN) compare as equal.
    pub fn compare(&self, other: &Field) -> Result<Ordering, FieldError> {
        use FieldValue::*;
        match (&self.value, &other.value) {
            (Bool(a), Bool(b)) => Ok(a.cmp(b)),
            (Int(a), Int(b)) => Ok(a.cmp(b)),
            (Uint(a), Uint(b)) => Ok(a.cmp(b)),
            (Float(a), Float(b)) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
            (String(a), String(b)) => Ok(a.cmp(b)),
            (Nil, Nil) => Err(FieldError::NilComparison),
            (a, b) => Err(FieldError::TypeMismatch {
                left: a.field_type(),
                right: b.field_type(),
            }),
        }
    }
}
