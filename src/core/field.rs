//! Field value types and field paths

use crate::core::error::QueryError;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of a managed entity
pub type EntityId = Uuid;

/// A polymorphic field value that can hold different types
///
/// Serialized untagged. `Reference` is tried before `String` when
/// deserializing, so any UUID-shaped string reads back as a reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    /// To-one relationship, compared by identity
    Reference(EntityId),
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// To-many relationship in insertion order
    Collection(Vec<EntityId>),
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view used by aggregation; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get the value as an entity reference if possible
    pub fn as_reference(&self) -> Option<EntityId> {
        match self {
            FieldValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the value as a to-many collection if possible
    pub fn as_collection(&self) -> Option<&[EntityId]> {
        match self {
            FieldValue::Collection(ids) => Some(ids),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Reference(_) => "reference",
            FieldValue::Collection(_) => "collection",
            FieldValue::Null => "null",
        }
    }

    /// Order two values.
    ///
    /// Integers and floats compare numerically with each other. References
    /// and collections only ever compare equal (same identity) or not at all.
    /// Returns `None` for incomparable pairs, including anything against
    /// `Null`.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Reference(a), FieldValue::Reference(b)) if a == b => {
                Some(Ordering::Equal)
            }
            (FieldValue::Collection(a), FieldValue::Collection(b)) if a == b => {
                Some(Ordering::Equal)
            }
            _ => None,
        }
    }

    /// Equality as seen by predicates: `Null` never matches anything
    pub fn matches(&self, other: &FieldValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Total order for sorting.
    ///
    /// Null sorts first, then numbers, strings, booleans, references and
    /// collections. Numbers order by `f64::total_cmp` after widening (NaN
    /// sorts after every other number); an integer and a float that widen
    /// to the same value order integer first.
    pub fn sort_order(a: &FieldValue, b: &FieldValue) -> Ordering {
        a.sort_rank().cmp(&b.sort_rank()).then_with(|| match (a, b) {
            (FieldValue::String(x), FieldValue::String(y)) => x.cmp(y),
            (FieldValue::Boolean(x), FieldValue::Boolean(y)) => x.cmp(y),
            (FieldValue::Reference(x), FieldValue::Reference(y)) => x.cmp(y),
            (FieldValue::Collection(x), FieldValue::Collection(y)) => x.cmp(y),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x
                    .total_cmp(&y)
                    .then_with(|| a.is_float().cmp(&b.is_float()))
                    .then_with(|| a.as_integer().cmp(&b.as_integer())),
                _ => Ordering::Equal,
            },
        })
    }

    fn is_float(&self) -> bool {
        matches!(self, FieldValue::Float(_))
    }

    fn sort_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Integer(_) | FieldValue::Float(_) => 1,
            FieldValue::String(_) => 2,
            FieldValue::Boolean(_) => 3,
            FieldValue::Reference(_) => 4,
            FieldValue::Collection(_) => 5,
        }
    }
}

/// Literal syntax of predicate format strings. Strings are quoted with `\`
/// escapes and whole floats keep a `.0`, so both parse back to the same
/// value. References, collections and non-finite floats have no literal form.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("\"")
            }
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{}.0", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Reference(id) => write!(f, "<{}>", id),
            FieldValue::Collection(ids) => write!(f, "[{} entities]", ids.len()),
            FieldValue::Null => write!(f, "nil"),
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
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<EntityId> for FieldValue {
    fn from(value: EntityId) -> Self {
        FieldValue::Reference(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// A dotted attribute path such as `type.name`
///
/// Each segment but the last must name a to-one relationship; the store
/// resolves the path, so this type only carries the segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path, rejecting empty input and empty segments
    pub fn parse(path: &str) -> Result<Self, QueryError> {
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(QueryError::InvalidFieldPath {
                path: path.to_string(),
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment, the attribute on the queried entity itself
    pub fn head(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    /// True when the path does not cross a relationship
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Lenient conversion used by the predicate builders; malformed segments
/// surface later as unknown fields when the store resolves the path.
impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        FieldPath::from(path.as_str())
    }
}

impl From<&FieldPath> for FieldPath {
    fn from(path: &FieldPath) -> Self {
        path.clone()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl<'de> Deserialize<'de> for FieldPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let path = String::deserialize(deserializer)?;
        FieldPath::parse(&path).map_err(serde::de::Error::custom)
    }
}

/// Anything that can resolve a field path to a value
///
/// Stores implement this per entity so predicates never walk the object
/// graph themselves. Missing paths resolve to `None`.
pub trait FieldSource {
    fn resolve(&self, path: &FieldPath) -> Option<FieldValue>;
}
