use std::{future::Future, marker::PhantomData};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Error as SqlxError, FromRow, QueryBuilder, Sqlite, SqlitePool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use erp_search_core::{
    Clause, DataSource, DataSourceError, FieldDef, FieldValue, Operator, PageWindow, Predicate,
    Specification,
};

use crate::to_rfc3339;

/// Database row that maps onto one search entity.
pub trait TableRow: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static {
    type Entity: Send;

    fn into_entity(self) -> Result<Self::Entity, DataSourceError>;
}

/// SQLite-backed data source for the entity produced by `R`.
///
/// Specifications are compiled into parameterized SQL. Column and table names
/// only ever come from static field tables.
pub struct SqliteSource<R> {
    pool: SqlitePool,
    row: PhantomData<fn() -> R>,
}

impl<R> Clone for SqliteSource<R> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<R> SqliteSource<R> {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            row: PhantomData,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl<R: TableRow> DataSource<R::Entity> for SqliteSource<R> {
    async fn count(
        &self,
        spec: &Specification,
        cancel: &CancellationToken,
    ) -> Result<u64, DataSourceError> {
        let mut builder = count_statement(spec);
        debug!(stage = "storage", entity = spec.table().entity, sql = builder.sql(), "count");
        let total: i64 = cancellable(
            cancel,
            builder.build_query_scalar::<i64>().fetch_one(&self.pool),
        )
        .await?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn fetch(
        &self,
        spec: &Specification,
        window: PageWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<R::Entity>, DataSourceError> {
        let mut builder = select_statement(spec, window);
        debug!(stage = "storage", entity = spec.table().entity, sql = builder.sql(), "fetch");
        let rows = cancellable(cancel, builder.build_query_as::<R>().fetch_all(&self.pool)).await?;
        rows.into_iter().map(TableRow::into_entity).collect()
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, query: F) -> Result<T, DataSourceError>
where
    F: Future<Output = Result<T, SqlxError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DataSourceError::Cancelled),
        result = query => result.map_err(classify),
    }
}

/// Maps a driver error onto the data source taxonomy.
///
/// Pool exhaustion, closed pools, I/O failures and SQLite busy/locked codes are
/// transient; everything else is a backend fault.
pub(crate) fn classify(err: SqlxError) -> DataSourceError {
    match err {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::WorkerCrashed => {
            DataSourceError::Unavailable(err.to_string())
        }
        SqlxError::Io(_) => DataSourceError::Unavailable(err.to_string()),
        SqlxError::Database(ref db_err)
            if matches!(db_err.code().as_deref(), Some("5") | Some("6")) =>
        {
            warn!(stage = "storage", error = %err, "sqlite busy while searching");
            DataSourceError::Unavailable(err.to_string())
        }
        other => DataSourceError::Backend(other.to_string()),
    }
}

pub(crate) fn select_statement(
    spec: &Specification,
    window: PageWindow,
) -> QueryBuilder<'static, Sqlite> {
    let table = spec.table();
    let columns = table
        .all()
        .map(|field| field.column)
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder = QueryBuilder::new(format!("SELECT {columns} FROM {}", table.source));
    push_where(&mut builder, spec);
    push_order(&mut builder, spec);
    builder.push(" LIMIT ");
    builder.push_bind(i64::try_from(window.take).unwrap_or(i64::MAX));
    builder.push(" OFFSET ");
    builder.push_bind(i64::try_from(window.skip).unwrap_or(i64::MAX));
    builder
}

pub(crate) fn count_statement(spec: &Specification) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", spec.table().source));
    push_where(&mut builder, spec);
    builder
}

fn push_where(builder: &mut QueryBuilder<'static, Sqlite>, spec: &Specification) {
    for (index, predicate) in spec.predicates().iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        match predicate {
            Predicate::Clause(clause) => push_clause(builder, clause),
            Predicate::Keyword { fields, term } => push_keyword(builder, fields, term),
        }
    }
}

fn push_clause(builder: &mut QueryBuilder<'static, Sqlite>, clause: &Clause) {
    let column = clause.field.column;
    let fold = clause.folds_case();
    let (lhs, rhs) = if fold {
        (format!("LOWER({column})"), "LOWER(")
    } else {
        (column.to_string(), "(")
    };

    match clause.op {
        Operator::Contains => {
            builder.push(format!("instr({lhs}, {rhs}"));
            push_clause_value(builder, clause);
            builder.push(")) > 0");
        }
        Operator::Equals | Operator::AtLeast | Operator::AtMost => {
            let comparison = match clause.op {
                Operator::AtLeast => ">=",
                Operator::AtMost => "<=",
                _ => "=",
            };
            builder.push(format!("{lhs} {comparison} {rhs}"));
            push_clause_value(builder, clause);
            builder.push(")");
        }
    }
}

fn push_keyword(builder: &mut QueryBuilder<'static, Sqlite>, fields: &[FieldDef], term: &str) {
    builder.push("(");
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        builder.push(format!("instr(LOWER({}), LOWER(", field.column));
        builder.push_bind(term.to_string());
        builder.push(")) > 0");
    }
    builder.push(")");
}

fn push_clause_value(builder: &mut QueryBuilder<'static, Sqlite>, clause: &Clause) {
    match clause.value {
        FieldValue::Timestamp(at) => {
            builder.push_bind(timestamp_bound(at, clause.op));
        }
        ref value => push_value(builder, value),
    }
}

/// Stored timestamps carry millisecond precision. A finer bound is moved onto
/// the millisecond grid so it still selects exactly the rows it would in memory.
pub(crate) fn timestamp_bound(at: DateTime<Utc>, op: Operator) -> String {
    let excess = i64::from(at.timestamp_subsec_nanos() % 1_000_000);
    if excess == 0 {
        return to_rfc3339(at);
    }
    match op {
        Operator::AtLeast => {
            to_rfc3339(at - Duration::nanoseconds(excess) + Duration::milliseconds(1))
        }
        Operator::AtMost => to_rfc3339(at),
        // Never equal to a stored millisecond value.
        Operator::Equals | Operator::Contains => at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Null => builder.push_bind(None::<String>),
        FieldValue::Text(text) => builder.push_bind(text.clone()),
        FieldValue::Integer(number) => builder.push_bind(*number),
        FieldValue::Decimal(number) => builder.push_bind(*number),
        FieldValue::Boolean(flag) => builder.push_bind(*flag),
        FieldValue::Timestamp(at) => builder.push_bind(to_rfc3339(*at)),
        FieldValue::Uuid(id) => builder.push_bind(id.to_string()),
    };
}

fn push_order(builder: &mut QueryBuilder<'static, Sqlite>, spec: &Specification) {
    for (index, key) in spec.ordering().iter().enumerate() {
        builder.push(if index == 0 { " ORDER BY " } else { ", " });
        builder.push(key.field.column);
        if key.field.kind.folds_case() {
            builder.push(" COLLATE NOCASE");
        }
        builder.push(" ");
        builder.push(key.direction.as_sql());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use erp_search_core::{
        accounting::{CheckSearchFilter, CHECKS},
        store::{SupplierSearchFilter, SUPPLIERS},
        validate, PaginationFilter, SpecificationBuilder,
    };

    fn check_spec(filter: &CheckSearchFilter) -> Specification {
        let validated = validate(filter, &CHECKS).expect("valid filter");
        SpecificationBuilder::new(&CHECKS).build(&validated)
    }

    #[test]
    fn unfiltered_select_orders_by_default_sort_then_id() {
        let spec = check_spec(&CheckSearchFilter::default());
        let builder = select_statement(&spec, PageWindow { skip: 20, take: 10 });
        assert_eq!(
            builder.sql(),
            "SELECT id, check_number, bank_account_code, bank_name, status, amount, payee_name, \
             issued_date, is_printed, is_stop_payment, memo FROM checks \
             ORDER BY check_number ASC, id ASC LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn clauses_are_parameterized() {
        let filter = CheckSearchFilter {
            payee_name: Some("acme".into()),
            status: Some("Issued".into()),
            amount_min: Some(10.0),
            ..CheckSearchFilter::default()
        };
        let builder = count_statement(&check_spec(&filter));
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM checks WHERE status = (?) \
             AND instr(LOWER(payee_name), LOWER(?)) > 0 AND amount >= (?)"
        );
    }

    #[test]
    fn keyword_expands_to_any_searchable_column() {
        let filter = SupplierSearchFilter {
            page: PaginationFilter {
                keyword: Some("north".into()),
                order_by: vec!["city desc".into()],
                ..PaginationFilter::default()
            },
            ..SupplierSearchFilter::default()
        };
        let validated = validate(&filter, &SUPPLIERS).expect("valid filter");
        let spec = SpecificationBuilder::new(&SUPPLIERS).build(&validated);
        let builder = select_statement(&spec, PageWindow { skip: 0, take: 10 });
        let sql = builder.sql();
        assert!(sql.contains(
            "WHERE (instr(LOWER(code), LOWER(?)) > 0 OR instr(LOWER(name), LOWER(?)) > 0 \
             OR instr(LOWER(contact_person), LOWER(?)) > 0 OR instr(LOWER(email), LOWER(?)) > 0)"
        ));
        assert!(sql.contains("ORDER BY city COLLATE NOCASE DESC, id ASC"));
    }

    #[test]
    fn sub_millisecond_bounds_snap_inward() {
        let at = Utc.with_ymd_and_hms(2024, 1, 4, 8, 0, 0).unwrap()
            + Duration::microseconds(500);
        assert_eq!(
            timestamp_bound(at, Operator::AtLeast),
            "2024-01-04T08:00:00.001Z"
        );
        assert_eq!(
            timestamp_bound(at, Operator::AtMost),
            "2024-01-04T08:00:00.000Z"
        );
        assert_ne!(
            timestamp_bound(at, Operator::Equals),
            "2024-01-04T08:00:00.000Z"
        );

        let whole = Utc.with_ymd_and_hms(2024, 1, 4, 8, 0, 0).unwrap();
        assert_eq!(
            timestamp_bound(whole, Operator::AtLeast),
            "2024-01-04T08:00:00.000Z"
        );
    }

    #[test]
    fn transient_driver_errors_are_unavailable() {
        assert!(classify(SqlxError::PoolTimedOut).is_transient());
        assert!(classify(SqlxError::PoolClosed).is_transient());
        assert!(matches!(
            classify(SqlxError::RowNotFound),
            DataSourceError::Backend(_)
        ));
    }
}
