use std::{cmp::Ordering, collections::BTreeMap, fmt};

use serde::Serialize;
use thiserror::Error;

use crate::field::{FieldKind, FieldTable};
use crate::filter::{
    Criterion, Operator, PageRequest, SearchFilter, KEYWORD_MAX_LEN, MAX_PAGE_SIZE,
};
use crate::spec::{Projection, SortDirection, SortKey};

/// A single rejected filter input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Filter rejected before reaching the data source. Lists every offending input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("filter validation failed: {}", summarize(.violations))]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Groups messages by field, in the shape used by problem responses.
    pub fn by_field(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for violation in &self.violations {
            grouped
                .entry(violation.field.clone())
                .or_default()
                .push(violation.message.clone());
        }
        grouped
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|violation| violation.field == field)
    }
}

#[derive(Debug, Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError { violations: self.0 })
        }
    }
}

/// Filter that passed validation against a field table.
///
/// Only present criteria are kept; text values are trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFilter {
    pub page: PageRequest,
    pub keyword: Option<String>,
    pub criteria: Vec<Criterion>,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
}

/// Checks a search filter against the entity's field table, collecting every violation.
pub fn validate<F>(filter: &F, table: &'static FieldTable) -> Result<ValidatedFilter, ValidationError>
where
    F: SearchFilter + ?Sized,
{
    let pagination = filter.pagination();
    let mut violations = Violations::default();

    if pagination.page_number < 1 {
        violations.push("pageNumber", "must be greater than or equal to 1");
    } else if pagination.page_number > i64::from(u32::MAX) {
        violations.push("pageNumber", format!("must not exceed {}", u32::MAX));
    }
    if pagination.page_size < 1 || pagination.page_size > i64::from(MAX_PAGE_SIZE) {
        violations.push("pageSize", format!("must be between 1 and {MAX_PAGE_SIZE}"));
    }
    let page = u32::try_from(pagination.page_number)
        .ok()
        .zip(u32::try_from(pagination.page_size).ok())
        .and_then(|(number, size)| PageRequest::new(number, size));

    let keyword = pagination
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string);
    if let Some(keyword) = &keyword {
        if keyword.chars().count() > KEYWORD_MAX_LEN {
            violations.push(
                "keyword",
                format!("must not exceed {KEYWORD_MAX_LEN} characters"),
            );
        }
    }

    let criteria = validate_criteria(filter.criteria(), table, &mut violations);
    let sort = validate_sort(&pagination.order_by, table, &mut violations);
    let projection = pagination
        .fields
        .as_ref()
        .map(|fields| validate_projection(fields, table, &mut violations));

    match page {
        Some(page) => violations.finish(ValidatedFilter {
            page,
            keyword,
            criteria,
            sort,
            projection,
        }),
        None => Err(ValidationError {
            violations: violations.0,
        }),
    }
}

fn validate_criteria(
    criteria: Vec<Criterion>,
    table: &FieldTable,
    violations: &mut Violations,
) -> Vec<Criterion> {
    let mut accepted = Vec::with_capacity(criteria.len());
    for mut criterion in criteria.into_iter().filter(Criterion::is_present) {
        let Some(field) = table.field(criterion.field) else {
            violations.push(
                criterion.input,
                format!("unknown {} field '{}'", table.entity, criterion.field),
            );
            continue;
        };

        if !field.kind.accepts(&criterion.value) {
            violations.push(
                criterion.input,
                format!("expected a {} value", field.kind.as_str()),
            );
            continue;
        }

        let supported = match criterion.op {
            Operator::Equals => true,
            Operator::Contains => field.kind.is_textual(),
            Operator::AtLeast | Operator::AtMost => field.kind.is_ordered(),
        };
        if !supported {
            violations.push(
                criterion.input,
                format!(
                    "operator '{}' is not supported for {} fields",
                    criterion.op.as_str(),
                    field.kind.as_str()
                ),
            );
            continue;
        }

        if let Some(text) = criterion.value.as_text() {
            let trimmed = text.trim().to_string();
            if let Some(max_len) = field.max_len {
                if trimmed.chars().count() > max_len {
                    violations.push(
                        criterion.input,
                        format!("must not exceed {max_len} characters"),
                    );
                    continue;
                }
            }
            if let FieldKind::Enum(allowed) = field.kind {
                if !allowed.contains(&trimmed.as_str()) {
                    violations.push(
                        criterion.input,
                        format!("must be one of: {}", allowed.join(", ")),
                    );
                    continue;
                }
            }
            criterion.value = trimmed.into();
        }

        accepted.push(criterion);
    }

    check_ranges(&accepted, violations);
    accepted
}

fn check_ranges(criteria: &[Criterion], violations: &mut Violations) {
    for lower in criteria.iter().filter(|c| c.op == Operator::AtLeast) {
        let upper = criteria
            .iter()
            .find(|c| c.op == Operator::AtMost && c.field == lower.field);
        if let Some(upper) = upper {
            if lower.value.compare(&upper.value, false) == Some(Ordering::Greater) {
                violations.push(
                    lower.input,
                    format!("must not be greater than {}", upper.input),
                );
            }
        }
    }
}

fn validate_sort(order_by: &[String], table: &FieldTable, violations: &mut Violations) -> Vec<SortKey> {
    let mut keys: Vec<SortKey> = Vec::with_capacity(order_by.len());
    for entry in order_by {
        let mut parts = entry.split_whitespace();
        let Some(name) = parts.next() else {
            continue;
        };
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => SortDirection::Ascending,
            Some("desc") => SortDirection::Descending,
            Some(other) => {
                violations.push("orderBy", format!("unknown sort direction '{other}'"));
                continue;
            }
        };
        if parts.next().is_some() {
            violations.push("orderBy", format!("malformed sort entry '{entry}'"));
            continue;
        }
        match table.field(name) {
            Some(field) if field.sortable || field.name == table.id.name => {
                let earlier = keys
                    .iter()
                    .find(|key| key.field.name == field.name)
                    .map(|key| key.direction);
                match earlier {
                    None => keys.push(SortKey {
                        field: *field,
                        direction,
                    }),
                    Some(earlier) if earlier != direction => violations.push(
                        "orderBy",
                        format!("field '{name}' is sorted in both directions"),
                    ),
                    Some(_) => {}
                }
            }
            Some(_) => violations.push("orderBy", format!("field '{name}' is not sortable")),
            None => violations.push(
                "orderBy",
                format!("unknown {} field '{name}'", table.entity),
            ),
        }
    }
    keys
}

fn validate_projection(
    fields: &[String],
    table: &FieldTable,
    violations: &mut Violations,
) -> Projection {
    let mut names = vec![table.id.name];
    for name in fields.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        match table.field(name) {
            Some(field) => {
                if !names.contains(&field.name) {
                    names.push(field.name);
                }
            }
            None => violations.push(
                "fields",
                format!("unknown {} field '{name}'", table.entity),
            ),
        }
    }
    Projection::new(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDef, FieldValue};
    use crate::filter::PaginationFilter;

    const STATUSES: &[&str] = &["Open", "Closed"];
    const FIELDS: &[FieldDef] = &[
        FieldDef::new("name", "name", FieldKind::Text)
            .max_len(10)
            .sortable()
            .searchable(),
        FieldDef::new("status", "status", FieldKind::Enum(STATUSES)),
        FieldDef::new("total", "total", FieldKind::Decimal).sortable(),
        FieldDef::new("memo", "memo", FieldKind::Text),
    ];
    static TABLE: FieldTable = FieldTable {
        entity: "widget",
        source: "widgets",
        id: FieldDef::new("id", "id", FieldKind::Uuid),
        default_sort: "name",
        fields: FIELDS,
    };

    struct WidgetFilter {
        page: PaginationFilter,
        criteria: Vec<Criterion>,
    }

    impl SearchFilter for WidgetFilter {
        fn pagination(&self) -> &PaginationFilter {
            &self.page
        }

        fn criteria(&self) -> Vec<Criterion> {
            self.criteria.clone()
        }
    }

    fn widget_filter(criteria: Vec<Criterion>) -> WidgetFilter {
        WidgetFilter {
            page: PaginationFilter::default(),
            criteria,
        }
    }

    #[test]
    fn accepts_defaults() {
        let validated = validate(&PaginationFilter::default(), &TABLE).expect("defaults are valid");
        assert_eq!(validated.page, PageRequest::new(1, 10).expect("page"));
        assert!(validated.criteria.is_empty());
        assert!(validated.sort.is_empty());
        assert!(validated.projection.is_none());
    }

    #[test]
    fn rejects_out_of_range_paging_with_both_fields_listed() {
        let err = validate(&PaginationFilter::page(0, 101), &TABLE).expect_err("invalid page");
        assert!(err.has_field("pageNumber"));
        assert!(err.has_field("pageSize"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn rejects_negative_page_size() {
        let err = validate(&PaginationFilter::page(1, -5), &TABLE).expect_err("invalid size");
        assert!(err.has_field("pageSize"));
    }

    #[test]
    fn enforces_text_length_and_enum_membership() {
        let filter = widget_filter(vec![
            Criterion::contains("name", "far too long a name"),
            Criterion::equals("status", "open"),
        ]);
        let err = validate(&filter, &TABLE).expect_err("invalid criteria");
        let grouped = err.by_field();
        assert_eq!(grouped["name"], vec!["must not exceed 10 characters".to_string()]);
        assert_eq!(grouped["status"], vec!["must be one of: Open, Closed".to_string()]);
    }

    #[test]
    fn drops_blank_criteria_and_trims_text() {
        let filter = widget_filter(vec![
            Criterion::contains("name", "  gear "),
            Criterion::equals("memo", "   "),
            Criterion::equals("status", None::<String>),
        ]);
        let validated = validate(&filter, &TABLE).expect("valid");
        assert_eq!(validated.criteria.len(), 1);
        assert_eq!(validated.criteria[0].value, FieldValue::from("gear"));
    }

    #[test]
    fn rejects_inverted_ranges() {
        let filter = widget_filter(vec![
            Criterion::at_least("totalMin", "total", 50.0),
            Criterion::at_most("totalMax", "total", 10.0),
        ]);
        let err = validate(&filter, &TABLE).expect_err("inverted range");
        assert!(err.has_field("totalMin"));
    }

    #[test]
    fn rejects_unsupported_operator_and_value_kind() {
        let filter = widget_filter(vec![
            Criterion::at_least("nameFrom", "name", "a"),
            Criterion::equals("total", "ten"),
            Criterion::equals("missing", "x"),
        ]);
        let err = validate(&filter, &TABLE).expect_err("invalid criteria");
        assert!(err.has_field("nameFrom"));
        assert!(err.has_field("total"));
        assert!(err.has_field("missing"));
    }

    #[test]
    fn parses_order_by_entries() {
        let mut page = PaginationFilter::default();
        page.order_by = vec!["total DESC".into(), "name".into(), "total desc".into()];
        let validated = validate(&page, &TABLE).expect("valid sort");
        assert_eq!(validated.sort.len(), 2);
        assert_eq!(validated.sort[0].field.name, "total");
        assert_eq!(validated.sort[0].direction, SortDirection::Descending);
        assert_eq!(validated.sort[1].direction, SortDirection::Ascending);
    }

    #[test]
    fn rejects_unsortable_unknown_and_malformed_sort_entries() {
        let mut page = PaginationFilter::default();
        page.order_by = vec!["memo".into(), "colour".into(), "name sideways".into()];
        let err = validate(&page, &TABLE).expect_err("invalid sort");
        assert_eq!(err.violations().len(), 3);
        assert!(err.violations().iter().all(|v| v.field == "orderBy"));
    }

    #[test]
    fn rejects_field_sorted_in_both_directions() {
        let mut page = PaginationFilter::default();
        page.order_by = vec!["total desc".into(), "total asc".into()];
        let err = validate(&page, &TABLE).expect_err("conflicting sort");
        assert_eq!(err.violations().len(), 1);
        assert!(err.has_field("orderBy"));
    }

    #[test]
    fn projection_always_includes_identifier() {
        let mut page = PaginationFilter::default();
        page.fields = Some(vec!["name".into(), "name".into()]);
        let validated = validate(&page, &TABLE).expect("valid projection");
        let projection = validated.projection.expect("projection");
        assert_eq!(projection.fields(), ["id", "name"]);

        page.fields = Some(vec!["colour".into()]);
        let err = validate(&page, &TABLE).expect_err("unknown field");
        assert!(err.has_field("fields"));
    }

    #[test]
    fn rejects_overlong_keyword() {
        let mut page = PaginationFilter::default();
        page.keyword = Some("x".repeat(KEYWORD_MAX_LEN + 1));
        let err = validate(&page, &TABLE).expect_err("keyword too long");
        assert!(err.has_field("keyword"));
    }
}
