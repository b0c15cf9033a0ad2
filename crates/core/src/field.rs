use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Kind of value stored in an entity field.
///
/// The kind decides which operators a field accepts and whether text
/// comparisons fold case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text, compared case-insensitively.
    Text,
    /// Normalized code (SKU, check number), compared exactly.
    Code,
    /// Closed set of normalized values, compared exactly.
    Enum(&'static [&'static str]),
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Uuid,
}

impl FieldKind {
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Text | Self::Code | Self::Enum(_))
    }

    pub fn is_ordered(self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::Timestamp)
    }

    /// Returns `true` when equality and substring checks ignore ASCII case.
    pub fn folds_case(self) -> bool {
        matches!(self, Self::Text)
    }

    /// Returns `true` when a value of the provided shape can be compared with this field.
    pub fn accepts(self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => false,
            (Self::Text | Self::Code | Self::Enum(_), FieldValue::Text(_)) => true,
            (Self::Integer, FieldValue::Integer(_)) => true,
            (Self::Decimal, FieldValue::Decimal(_) | FieldValue::Integer(_)) => true,
            (Self::Boolean, FieldValue::Boolean(_)) => true,
            (Self::Timestamp, FieldValue::Timestamp(_)) => true,
            (Self::Uuid, FieldValue::Uuid(_)) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Enum(_) => "enum",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
        }
    }
}

/// Dynamically typed field value used by criteria, clauses and in-memory records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for empty or whitespace-only text, which filters treat as absent.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(value) if value.trim().is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    fn as_decimal(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    /// Compares two non-null values of compatible kinds.
    ///
    /// Returns `None` when either side is null or the kinds differ.
    pub fn compare(&self, other: &Self, fold_case: bool) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(left), Self::Text(right)) => {
                if fold_case {
                    Some(left.to_ascii_lowercase().cmp(&right.to_ascii_lowercase()))
                } else {
                    Some(left.cmp(right))
                }
            }
            (Self::Integer(left), Self::Integer(right)) => Some(left.cmp(right)),
            (Self::Boolean(left), Self::Boolean(right)) => Some(left.cmp(right)),
            (Self::Timestamp(left), Self::Timestamp(right)) => Some(left.cmp(right)),
            (Self::Uuid(left), Self::Uuid(right)) => Some(left.cmp(right)),
            (left, right) => {
                let (left, right) = (left.as_decimal()?, right.as_decimal()?);
                left.partial_cmp(&right)
            }
        }
    }

    /// Orders values for sorting: nulls first, then by [`FieldValue::compare`].
    pub fn sort_cmp(&self, other: &Self, fold_case: bool) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other, fold_case).unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            Self::Uuid(value) => write!(f, "{value}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Description of one addressable entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Wire name used by filters, `orderBy`, projections and serialized entities.
    pub name: &'static str,
    /// Storage column backing the field.
    pub column: &'static str,
    pub kind: FieldKind,
    pub max_len: Option<usize>,
    pub sortable: bool,
    pub searchable: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            max_len: None,
            sortable: false,
            searchable: false,
        }
    }

    pub const fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub const fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Marks the field as one of the targets of the free-text keyword.
    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }
}

/// Static field-mapping table for one entity type.
#[derive(Debug, PartialEq, Eq)]
pub struct FieldTable {
    pub entity: &'static str,
    /// Storage table or collection name.
    pub source: &'static str,
    pub id: FieldDef,
    pub default_sort: &'static str,
    pub fields: &'static [FieldDef],
}

impl FieldTable {
    /// Looks up a field by wire name, including the identifier.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        if self.id.name == name {
            return Some(&self.id);
        }
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn searchable(&self) -> impl Iterator<Item = &FieldDef> + '_ {
        self.fields.iter().filter(|field| field.searchable)
    }

    /// Iterates over the identifier followed by every other field.
    pub fn all(&self) -> impl Iterator<Item = &FieldDef> + '_ {
        std::iter::once(&self.id).chain(self.fields.iter())
    }
}
