use std::cmp::Ordering;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::executor::{DataSource, DataSourceError};
use crate::field::FieldValue;
use crate::filter::{Operator, PageWindow};
use crate::spec::{Clause, Predicate, SortDirection, Specification};

/// Field accessor used by the in-memory data source.
pub trait Record {
    /// Returns the value stored under a field's wire name, or `Null` when absent.
    fn value(&self, field: &str) -> FieldValue;
}

/// Data source over an owned collection, evaluating specifications in process.
#[derive(Debug, Clone, Default)]
pub struct MemorySource<T> {
    records: Vec<T>,
}

impl<T> MemorySource<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self { records }
    }
}

impl<T: Record> MemorySource<T> {
    fn matching<'a>(&'a self, spec: &'a Specification) -> impl Iterator<Item = &'a T> + 'a {
        self.records
            .iter()
            .filter(move |record| spec.predicates().iter().all(|p| matches(*record, p)))
    }
}

fn matches<T: Record>(record: &T, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Clause(clause) => clause_matches(record, clause),
        Predicate::Keyword { fields, term } => fields.iter().any(|field| {
            record
                .value(field.name)
                .as_text()
                .is_some_and(|value| contains(value, term, true))
        }),
    }
}

fn clause_matches<T: Record>(record: &T, clause: &Clause) -> bool {
    let actual = record.value(clause.field.name);
    let fold = clause.folds_case();
    match clause.op {
        Operator::Equals => actual.compare(&clause.value, fold) == Some(Ordering::Equal),
        Operator::Contains => match (actual.as_text(), clause.value.as_text()) {
            (Some(value), Some(term)) => contains(value, term, fold),
            _ => false,
        },
        Operator::AtLeast => matches!(
            actual.compare(&clause.value, fold),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::AtMost => matches!(
            actual.compare(&clause.value, fold),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn contains(value: &str, term: &str, fold: bool) -> bool {
    if fold {
        value
            .to_ascii_lowercase()
            .contains(&term.to_ascii_lowercase())
    } else {
        value.contains(term)
    }
}

fn compare_records<T: Record>(left: &T, right: &T, spec: &Specification) -> Ordering {
    for key in spec.ordering() {
        let fold = key.field.kind.folds_case();
        let ordering = left
            .value(key.field.name)
            .sort_cmp(&right.value(key.field.name), fold);
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl<T> DataSource<T> for MemorySource<T>
where
    T: Record + Clone + Send + Sync,
{
    async fn count(
        &self,
        spec: &Specification,
        cancel: &CancellationToken,
    ) -> Result<u64, DataSourceError> {
        if cancel.is_cancelled() {
            return Err(DataSourceError::Cancelled);
        }
        Ok(self.matching(spec).count() as u64)
    }

    async fn fetch(
        &self,
        spec: &Specification,
        window: PageWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, DataSourceError> {
        if cancel.is_cancelled() {
            return Err(DataSourceError::Cancelled);
        }
        let mut rows: Vec<&T> = self.matching(spec).collect();
        rows.sort_by(|left, right| compare_records(*left, *right, spec));
        let skip = usize::try_from(window.skip).unwrap_or(usize::MAX);
        let take = usize::try_from(window.take).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(take).cloned().collect())
    }
}
