//! Search pipeline shared by every ERP module.
//!
//! A module filter is validated against its entity's [`FieldTable`], turned into a
//! [`Specification`], and executed against a [`DataSource`] into a [`PagedResult`].

pub mod accounting;
pub mod executor;
pub mod field;
pub mod filter;
pub mod memory;
pub mod page;
pub mod spec;
pub mod store;
pub mod validation;

pub use executor::{DataSource, DataSourceError, QueryError, QueryExecutor};
pub use field::{FieldDef, FieldKind, FieldTable, FieldValue};
pub use filter::{
    Criterion, Operator, PageRequest, PageWindow, PaginationFilter, SearchFilter,
    DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE, KEYWORD_MAX_LEN, MAX_PAGE_SIZE,
};
pub use memory::{MemorySource, Record};
pub use page::PagedResult;
pub use spec::{
    Clause, Predicate, Projection, SortDirection, SortKey, Specification, SpecificationBuilder,
};
pub use validation::{validate, FieldViolation, ValidatedFilter, ValidationError};
