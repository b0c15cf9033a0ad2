use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::filter::{PageRequest, PageWindow};
use crate::page::PagedResult;
use crate::spec::Specification;

/// Errors surfaced by a data source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// Transient failure: the store could not be reached. Callers decide whether to retry.
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("data source error: {0}")]
    Backend(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl DataSourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Counted, filtered, paginated reads over one entity type.
///
/// `count` and `fetch` receive the same specification for a given request and
/// must honour the cancellation token.
#[async_trait]
pub trait DataSource<T: Send>: Send + Sync {
    async fn count(
        &self,
        spec: &Specification,
        cancel: &CancellationToken,
    ) -> Result<u64, DataSourceError>;

    async fn fetch(
        &self,
        spec: &Specification,
        window: PageWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, DataSourceError>;
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DataSource(err) if err.is_transient())
    }
}

/// Runs specifications against a data source and assembles paged results.
pub struct QueryExecutor<'a, S: ?Sized> {
    source: &'a S,
}

impl<'a, S: ?Sized> QueryExecutor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Fetches one page and the total count using the same specification.
    ///
    /// A page past the end is empty but still carries the total. A count lower
    /// than the rows actually returned is raised to cover them.
    pub async fn page<T>(
        &self,
        spec: &Specification,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> Result<PagedResult<T>, QueryError>
    where
        T: Send,
        S: DataSource<T>,
    {
        let window = page.window();
        let entity = spec.table().entity;

        ensure_active(cancel)?;
        let mut items = self.source.fetch(spec, window, cancel).await.map_err(lift)?;
        if items.len() as u64 > window.take {
            warn!(
                stage = "query",
                entity,
                returned = items.len(),
                take = window.take,
                "data source returned more rows than requested"
            );
            items.truncate(window.take as usize);
        }

        ensure_active(cancel)?;
        let mut total_count = self.source.count(spec, cancel).await.map_err(lift)?;
        let seen = window.skip + items.len() as u64;
        if !items.is_empty() && total_count < seen {
            warn!(
                stage = "query",
                entity,
                total_count,
                seen,
                "count lower than rows fetched, raising total"
            );
            total_count = seen;
        }

        debug!(
            stage = "query",
            entity,
            page = page.number(),
            size = page.size(),
            returned = items.len(),
            total_count,
            "page fetched"
        );

        Ok(PagedResult::new(items, page, total_count))
    }

    /// Returns the first entity matching the specification, if any.
    pub async fn first<T>(
        &self,
        spec: &Specification,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, QueryError>
    where
        T: Send,
        S: DataSource<T>,
    {
        ensure_active(cancel)?;
        let items = self
            .source
            .fetch(spec, PageRequest::single().window(), cancel)
            .await
            .map_err(lift)?;
        Ok(items.into_iter().next())
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), QueryError> {
    if cancel.is_cancelled() {
        return Err(QueryError::Cancelled);
    }
    Ok(())
}

fn lift(err: DataSourceError) -> QueryError {
    match err {
        DataSourceError::Cancelled => QueryError::Cancelled,
        other => QueryError::DataSource(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::field::{FieldDef, FieldKind, FieldTable, FieldValue};
    use crate::filter::PaginationFilter;
    use crate::memory::{MemorySource, Record};
    use crate::spec::SpecificationBuilder;
    use crate::validation::validate;

    const FIELDS: &[FieldDef] = &[FieldDef::new("rank", "rank", FieldKind::Integer).sortable()];
    static TABLE: FieldTable = FieldTable {
        entity: "row",
        source: "rows",
        id: FieldDef::new("id", "id", FieldKind::Integer),
        default_sort: "rank",
        fields: FIELDS,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        rank: i64,
    }

    impl Record for Row {
        fn value(&self, field: &str) -> FieldValue {
            match field {
                "id" => self.id.into(),
                "rank" => self.rank.into(),
                _ => FieldValue::Null,
            }
        }
    }

    fn rows(count: i64) -> MemorySource<Row> {
        MemorySource::new((1..=count).map(|id| Row { id, rank: id }).collect())
    }

    fn spec() -> Specification {
        let validated = validate(&PaginationFilter::default(), &TABLE).expect("valid");
        SpecificationBuilder::new(&TABLE).build(&validated)
    }

    fn page(number: u32, size: u32) -> PageRequest {
        PageRequest::new(number, size).expect("valid page")
    }

    #[tokio::test]
    async fn first_page_of_twenty_five() {
        let source = rows(25);
        let result = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(1, 10), &CancellationToken::new())
            .await
            .expect("page");
        assert_eq!(result.items().len(), 10);
        assert_eq!(result.total_count(), 25);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(!result.has_previous());
        assert_eq!(result.items()[0].id, 1);
    }

    #[tokio::test]
    async fn third_page_of_twenty_five() {
        let source = rows(25);
        let result = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(3, 10), &CancellationToken::new())
            .await
            .expect("page");
        assert_eq!(result.items().len(), 5);
        assert_eq!(result.items()[0].id, 21);
        assert!(!result.has_next());
        assert!(result.has_previous());
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty_with_total() {
        let source = rows(25);
        let result = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(4, 10), &CancellationToken::new())
            .await
            .expect("page");
        assert!(result.items().is_empty());
        assert_eq!(result.total_count(), 25);
        assert!(!result.has_next());
    }

    #[tokio::test]
    async fn no_matches_yields_empty_result() {
        let source = rows(0);
        let result = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(1, 10), &CancellationToken::new())
            .await
            .expect("page");
        assert!(result.items().is_empty());
        assert_eq!(result.total_count(), 0);
        assert_eq!(result.total_pages(), 0);
        assert!(!result.has_next());
        assert!(!result.has_previous());
    }

    #[tokio::test]
    async fn items_never_exceed_page_size() {
        let source = rows(37);
        for size in [1u32, 3, 10, 36, 37, 100] {
            for number in 1..=5u32 {
                let result = QueryExecutor::new(&source)
                    .page::<Row>(&spec(), page(number, size), &CancellationToken::new())
                    .await
                    .expect("page");
                assert!(result.items().len() <= size as usize);
                assert_eq!(result.total_count(), 37);
                assert_eq!(
                    result.has_next(),
                    u64::from(number) < result.total_pages()
                );
            }
        }
    }

    #[derive(Default)]
    struct RecordingSource {
        seen: Mutex<Vec<(&'static str, Specification)>>,
        total: u64,
        rows: Vec<Row>,
        unavailable: bool,
    }

    #[async_trait]
    impl DataSource<Row> for RecordingSource {
        async fn count(
            &self,
            spec: &Specification,
            _cancel: &CancellationToken,
        ) -> Result<u64, DataSourceError> {
            self.seen.lock().expect("seen").push(("count", spec.clone()));
            Ok(self.total)
        }

        async fn fetch(
            &self,
            spec: &Specification,
            _window: PageWindow,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Row>, DataSourceError> {
            self.seen.lock().expect("seen").push(("fetch", spec.clone()));
            if self.unavailable {
                return Err(DataSourceError::Unavailable("pool timed out".into()));
            }
            Ok(self.rows.clone())
        }
    }

    #[tokio::test]
    async fn fetch_and_count_receive_identical_specifications() {
        let source = RecordingSource {
            total: 3,
            rows: vec![Row { id: 1, rank: 1 }],
            ..RecordingSource::default()
        };
        let spec = spec();
        QueryExecutor::new(&source)
            .page::<Row>(&spec, page(1, 10), &CancellationToken::new())
            .await
            .expect("page");
        let seen = source.seen.lock().expect("seen");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "fetch");
        assert_eq!(seen[1].0, "count");
        assert_eq!(seen[0].1, spec);
        assert_eq!(seen[1].1, spec);
    }

    #[tokio::test]
    async fn unavailable_source_is_propagated() {
        let source = RecordingSource {
            unavailable: true,
            ..RecordingSource::default()
        };
        let err = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(1, 10), &CancellationToken::new())
            .await
            .expect_err("unavailable");
        assert!(err.is_transient());
        assert!(matches!(
            err,
            QueryError::DataSource(DataSourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn inconsistent_count_is_raised_to_rows_seen() {
        let source = RecordingSource {
            total: 0,
            rows: vec![Row { id: 1, rank: 1 }, Row { id: 2, rank: 2 }],
            ..RecordingSource::default()
        };
        let result = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(2, 2), &CancellationToken::new())
            .await
            .expect("page");
        assert_eq!(result.total_count(), 4);
    }

    #[tokio::test]
    async fn empty_page_keeps_reported_count() {
        let source = RecordingSource {
            total: 25,
            ..RecordingSource::default()
        };
        let result = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(4, 10), &CancellationToken::new())
            .await
            .expect("page");
        assert!(result.items().is_empty());
        assert_eq!(result.total_count(), 25);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_previous());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_the_data_source() {
        let source = RecordingSource::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = QueryExecutor::new(&source)
            .page::<Row>(&spec(), page(1, 10), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, QueryError::Cancelled));
        assert!(source.seen.lock().expect("seen").is_empty());
    }

    #[tokio::test]
    async fn first_returns_matching_entity() {
        let source = rows(5);
        let found = QueryExecutor::new(&source)
            .first::<Row>(&Specification::by_id(&TABLE, 4i64), &CancellationToken::new())
            .await
            .expect("lookup");
        assert_eq!(found, Some(Row { id: 4, rank: 4 }));

        let missing = QueryExecutor::new(&source)
            .first::<Row>(&Specification::by_id(&TABLE, 40i64), &CancellationToken::new())
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }
}
