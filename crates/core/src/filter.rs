use serde::{Deserialize, Serialize};

use crate::field::FieldValue;

pub const DEFAULT_PAGE_NUMBER: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const KEYWORD_MAX_LEN: usize = 256;

/// Paging, keyword, ordering and projection parameters shared by every search filter.
///
/// Numbers are kept signed and unchecked here so that out-of-range input
/// reaches validation and can be reported per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationFilter {
    pub page_number: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl Default for PaginationFilter {
    fn default() -> Self {
        Self {
            page_number: DEFAULT_PAGE_NUMBER,
            page_size: DEFAULT_PAGE_SIZE,
            keyword: None,
            order_by: Vec::new(),
            fields: None,
        }
    }
}

impl PaginationFilter {
    pub fn page(page_number: i64, page_size: i64) -> Self {
        Self {
            page_number,
            page_size,
            ..Self::default()
        }
    }
}

/// Comparison applied by a single predicate clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    /// Inclusive lower bound.
    AtLeast,
    /// Inclusive upper bound.
    AtMost,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::AtLeast => "at_least",
            Self::AtMost => "at_most",
        }
    }
}

/// One optional field-level condition contributed by a module filter.
///
/// A criterion whose value is null or blank text is absent and produces no clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    /// Wire name of the filter input, used when reporting violations.
    pub input: &'static str,
    /// Wire name of the entity field the criterion targets.
    pub field: &'static str,
    pub op: Operator,
    pub value: FieldValue,
}

impl Criterion {
    pub fn new(
        input: &'static str,
        field: &'static str,
        op: Operator,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self {
            input,
            field,
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, field, Operator::Equals, value)
    }

    pub fn contains(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Self::new(field, field, Operator::Contains, value)
    }

    pub fn at_least(
        input: &'static str,
        field: &'static str,
        value: impl Into<FieldValue>,
    ) -> Self {
        Self::new(input, field, Operator::AtLeast, value)
    }

    pub fn at_most(input: &'static str, field: &'static str, value: impl Into<FieldValue>) -> Self {
        Self::new(input, field, Operator::AtMost, value)
    }

    pub fn is_present(&self) -> bool {
        !self.value.is_null() && !self.value.is_blank()
    }
}

/// Implemented by every module's search filter.
pub trait SearchFilter {
    fn pagination(&self) -> &PaginationFilter;

    /// Returns the module criteria in a stable order, present or not.
    fn criteria(&self) -> Vec<Criterion>;
}

impl SearchFilter for PaginationFilter {
    fn pagination(&self) -> &PaginationFilter {
        self
    }

    fn criteria(&self) -> Vec<Criterion> {
        Vec::new()
    }
}

/// Validated page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    number: u32,
    size: u32,
}

impl PageRequest {
    /// Builds a page request, returning `None` when the coordinates are out of range.
    pub fn new(number: u32, size: u32) -> Option<Self> {
        if number == 0 || size == 0 || size > MAX_PAGE_SIZE {
            return None;
        }
        Some(Self { number, size })
    }

    /// Window covering only the first row, used by single-entity lookups.
    pub fn single() -> Self {
        Self { number: 1, size: 1 }
    }

    pub fn number(self) -> u32 {
        self.number
    }

    pub fn size(self) -> u32 {
        self.size
    }

    pub fn skip(self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    pub fn window(self) -> PageWindow {
        PageWindow {
            skip: self.skip(),
            take: u64::from(self.size),
        }
    }
}

/// Row window handed to a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: u64,
    pub take: u64,
}
