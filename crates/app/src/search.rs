use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use erp_search_core::{
    accounting::{Check, CheckSearchFilter, CHECKS},
    store::{Supplier, SupplierSearchFilter, SUPPLIERS},
    validate, DataSource, DataSourceError, FieldTable, Predicate, QueryError, QueryExecutor,
    SearchFilter, Specification, SpecificationBuilder, ValidationError,
};

use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::tap::{StageEvent, StageKind, StageMetadata, StagePayload};

/// Failures of a search or lookup request, mapped onto problem responses.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),
    #[error("invalid identifier: {0}")]
    Identifier(#[from] PathRejection),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("failed to shape results: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: Uuid },
}

impl SearchError {
    fn result_label(&self) -> &'static str {
        match self {
            Self::Body(_) | Self::Identifier(_) | Self::Validation(_) => "invalid",
            Self::Query(QueryError::Cancelled)
            | Self::Query(QueryError::DataSource(DataSourceError::Cancelled)) => "cancelled",
            Self::Query(err) if err.is_transient() => "unavailable",
            Self::Query(_) | Self::Serialize(_) => "error",
            Self::NotFound { .. } => "not_found",
        }
    }

    fn into_problem(self) -> ProblemResponse {
        let detail = self.to_string();
        match self {
            Self::Body(_) => ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_body", detail),
            Self::Identifier(_) => {
                ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_identifier", detail)
            }
            Self::Validation(err) => {
                ProblemResponse::new(StatusCode::BAD_REQUEST, "validation_failed", detail)
                    .with_errors(err.by_field())
            }
            Self::Query(QueryError::Cancelled)
            | Self::Query(QueryError::DataSource(DataSourceError::Cancelled)) => {
                ProblemResponse::new(StatusCode::SERVICE_UNAVAILABLE, "request_cancelled", detail)
            }
            Self::Query(QueryError::DataSource(DataSourceError::Unavailable(_))) => {
                ProblemResponse::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "data_source_unavailable",
                    detail,
                )
            }
            Self::Query(QueryError::DataSource(DataSourceError::Backend(_))) => {
                ProblemResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "data_source_error",
                    detail,
                )
            }
            Self::Serialize(_) => ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_failed",
                detail,
            ),
            Self::NotFound { .. } => {
                ProblemResponse::new(StatusCode::NOT_FOUND, "not_found", detail)
            }
        }
    }
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        self.into_problem().into_response()
    }
}

pub async fn search_checks(
    State(state): State<AppState>,
    body: Result<Json<CheckSearchFilter>, JsonRejection>,
) -> Result<Json<Value>, SearchError> {
    let started = Instant::now();
    let outcome = match body {
        Ok(Json(filter)) => {
            let source = state.storage().checks();
            search::<Check, _, _>(&state, &CHECKS, &source, &filter).await
        }
        Err(rejection) => Err(rejection.into()),
    };
    finish(CHECKS.entity, "search", started, outcome).map(Json)
}

pub async fn get_check(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Check>, SearchError> {
    let started = Instant::now();
    let outcome = match id {
        Ok(Path(id)) => lookup::<Check, _>(&CHECKS, &state.storage().checks(), id).await,
        Err(rejection) => Err(rejection.into()),
    };
    finish(CHECKS.entity, "lookup", started, outcome).map(Json)
}

pub async fn search_suppliers(
    State(state): State<AppState>,
    body: Result<Json<SupplierSearchFilter>, JsonRejection>,
) -> Result<Json<Value>, SearchError> {
    let started = Instant::now();
    let outcome = match body {
        Ok(Json(filter)) => {
            let source = state.storage().suppliers();
            search::<Supplier, _, _>(&state, &SUPPLIERS, &source, &filter).await
        }
        Err(rejection) => Err(rejection.into()),
    };
    finish(SUPPLIERS.entity, "search", started, outcome).map(Json)
}

pub async fn get_supplier(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Supplier>, SearchError> {
    let started = Instant::now();
    let outcome = match id {
        Ok(Path(id)) => lookup::<Supplier, _>(&SUPPLIERS, &state.storage().suppliers(), id).await,
        Err(rejection) => Err(rejection.into()),
    };
    finish(SUPPLIERS.entity, "lookup", started, outcome).map(Json)
}

/// Validates the filter, builds the specification, runs it and shapes the page.
///
/// Every stage is published to the tap. The query is cancelled if the request
/// future is dropped before it completes.
async fn search<T, S, F>(
    state: &AppState,
    table: &'static FieldTable,
    source: &S,
    filter: &F,
) -> Result<Value, SearchError>
where
    T: Serialize + Send,
    S: DataSource<T>,
    F: SearchFilter,
{
    let entity = table.entity;
    let tap = state.tap();
    let trace_id = Uuid::new_v4().to_string();
    let requested = filter.pagination();
    let request_shape = StagePayload::plain(json!({
        "pageNumber": requested.page_number,
        "pageSize": requested.page_size,
        "orderBy": requested.order_by.len(),
    }));

    let validated = match validate(filter, table) {
        Ok(validated) => validated,
        Err(err) => {
            counter!("search_validation_failures_total", "entity" => entity).increment(1);
            tap.publish(
                StageEvent::new(StageKind::Validate, entity)
                    .trace(&trace_id)
                    .meta(result_meta("invalid", None))
                    .input(request_shape)
                    .output(StagePayload::plain(json!(err.by_field()))),
            );
            return Err(err.into());
        }
    };
    tap.publish(
        StageEvent::new(StageKind::Validate, entity)
            .trace(&trace_id)
            .meta(result_meta("ok", None))
            .input(request_shape)
            .output(StagePayload::plain(json!({
                "pageNumber": validated.page.number(),
                "pageSize": validated.page.size(),
                "criteria": validated.criteria.len(),
                "keyword": validated.keyword.is_some(),
            }))),
    );

    let spec = SpecificationBuilder::new(table).build(&validated);
    tap.publish(
        StageEvent::new(StageKind::Specification, entity)
            .trace(&trace_id)
            .output(StagePayload::redacted(describe(&spec))),
    );

    let window = validated.page.window();
    let window_shape = StagePayload::plain(json!({
        "skip": window.skip,
        "take": window.take,
    }));
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let query_started = Instant::now();
    let outcome = QueryExecutor::new(source)
        .page::<T>(&spec, validated.page, &cancel)
        .await;
    let latency_ms = query_started.elapsed().as_secs_f64() * 1000.0;
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            tap.publish(
                StageEvent::new(StageKind::Query, entity)
                    .trace(&trace_id)
                    .input(window_shape)
                    .meta(StageMetadata {
                        result: Some("error"),
                        latency_ms: Some(latency_ms),
                        message: Some(err.to_string()),
                    }),
            );
            return Err(err.into());
        }
    };
    tap.publish(
        StageEvent::new(StageKind::Query, entity)
            .trace(&trace_id)
            .meta(result_meta("ok", Some(latency_ms)))
            .input(window_shape)
            .output(StagePayload::plain(json!({
                "returned": result.items().len(),
                "totalCount": result.total_count(),
            }))),
    );

    let summary = json!({
        "pageNumber": result.page_number(),
        "totalPages": result.total_pages(),
        "hasNext": result.has_next(),
        "projected": spec.projection().is_some(),
    });
    let body = match spec.projection() {
        Some(projection) => serde_json::to_value(result.project(projection)?)?,
        None => serde_json::to_value(&result)?,
    };
    tap.publish(
        StageEvent::new(StageKind::Page, entity)
            .trace(&trace_id)
            .output(StagePayload::plain(summary)),
    );

    Ok(body)
}

async fn lookup<T, S>(table: &'static FieldTable, source: &S, id: Uuid) -> Result<T, SearchError>
where
    T: Send,
    S: DataSource<T>,
{
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    QueryExecutor::new(source)
        .first::<T>(&Specification::by_id(table, id), &cancel)
        .await?
        .ok_or(SearchError::NotFound {
            entity: table.entity,
            id,
        })
}

fn finish<V>(
    entity: &'static str,
    operation: &'static str,
    started: Instant,
    outcome: Result<V, SearchError>,
) -> Result<V, SearchError> {
    let elapsed = started.elapsed();
    let result = match &outcome {
        Ok(_) => "ok",
        Err(err) => err.result_label(),
    };
    counter!("search_requests_total", "entity" => entity, "result" => result).increment(1);
    histogram!("search_latency_seconds", "entity" => entity).record(elapsed.as_secs_f64());

    let latency_ms = elapsed.as_secs_f64() * 1000.0;
    match &outcome {
        Ok(_) | Err(SearchError::NotFound { .. }) => {
            info!(stage = "app", entity, operation, result, latency_ms, "request completed")
        }
        Err(err) if result == "invalid" => {
            info!(stage = "app", entity, operation, result, error = %err, "request rejected")
        }
        Err(err) => warn!(
            stage = "app",
            entity,
            operation,
            result,
            latency_ms,
            error = %err,
            "request failed"
        ),
    }
    outcome
}

fn result_meta(result: &'static str, latency_ms: Option<f64>) -> StageMetadata {
    StageMetadata {
        result: Some(result),
        latency_ms,
        message: None,
    }
}

/// Shape of a specification without its bound values.
fn describe(spec: &Specification) -> Value {
    let predicates: Vec<Value> = spec
        .predicates()
        .iter()
        .map(|predicate| match predicate {
            Predicate::Clause(clause) => json!({
                "field": clause.field.name,
                "op": clause.op.as_str(),
            }),
            Predicate::Keyword { fields, .. } => json!({
                "keyword": fields.iter().map(|field| field.name).collect::<Vec<_>>(),
            }),
        })
        .collect();
    let ordering: Vec<String> = spec
        .ordering()
        .iter()
        .map(|key| format!("{} {}", key.field.name, key.direction.as_sql().to_lowercase()))
        .collect();
    json!({
        "predicates": predicates,
        "orderBy": ordering,
        "fields": spec.projection().map(|projection| projection.fields().to_vec()),
    })
}
