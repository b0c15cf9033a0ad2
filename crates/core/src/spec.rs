use tracing::debug;

use crate::field::{FieldDef, FieldTable, FieldValue};
use crate::filter::Operator;
use crate::validation::ValidatedFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: FieldDef,
    pub direction: SortDirection,
}

/// Subset of entity fields returned to the caller. Always starts with the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<&'static str>,
}

impl Projection {
    pub fn new(fields: Vec<&'static str>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[&'static str] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| *field == name)
    }
}

/// A single `(field, operator, value)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: FieldDef,
    pub op: Operator,
    pub value: FieldValue,
}

impl Clause {
    /// Returns `true` when text comparison for this clause ignores ASCII case.
    pub fn folds_case(&self) -> bool {
        self.field.kind.folds_case()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Clause(Clause),
    /// Matches when any of the fields contains the term, ignoring ASCII case.
    Keyword {
        fields: Vec<FieldDef>,
        term: String,
    },
}

/// Immutable query description: predicates joined by AND, an ordering and an optional projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    table: &'static FieldTable,
    predicates: Vec<Predicate>,
    ordering: Vec<SortKey>,
    projection: Option<Projection>,
}

impl Specification {
    /// Specification matching the single entity with the provided identifier.
    pub fn by_id(table: &'static FieldTable, id: impl Into<FieldValue>) -> Self {
        Self {
            table,
            predicates: vec![Predicate::Clause(Clause {
                field: table.id,
                op: Operator::Equals,
                value: id.into(),
            })],
            ordering: vec![SortKey {
                field: table.id,
                direction: SortDirection::Ascending,
            }],
            projection: None,
        }
    }

    pub fn table(&self) -> &'static FieldTable {
        self.table
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Sort keys in priority order. The last key is always the identifier.
    pub fn ordering(&self) -> &[SortKey] {
        &self.ordering
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }
}

/// Turns validated filters into specifications for one entity table.
#[derive(Debug, Clone, Copy)]
pub struct SpecificationBuilder {
    table: &'static FieldTable,
}

impl SpecificationBuilder {
    pub fn new(table: &'static FieldTable) -> Self {
        Self { table }
    }

    /// Emits one clause per criterion, then the keyword, then the ordering with an
    /// identifier tiebreak. The same input always yields the same specification.
    pub fn build(&self, filter: &ValidatedFilter) -> Specification {
        let table = self.table;
        let mut predicates: Vec<Predicate> = filter
            .criteria
            .iter()
            .filter_map(|criterion| {
                let field = table.field(criterion.field)?;
                Some(Predicate::Clause(Clause {
                    field: *field,
                    op: criterion.op,
                    value: criterion.value.clone(),
                }))
            })
            .collect();

        if let Some(term) = &filter.keyword {
            let fields: Vec<FieldDef> = table.searchable().copied().collect();
            if !fields.is_empty() {
                predicates.push(Predicate::Keyword {
                    fields,
                    term: term.clone(),
                });
            }
        }

        let mut ordering = filter.sort.clone();
        if ordering.is_empty() {
            if let Some(field) = table.field(table.default_sort) {
                ordering.push(SortKey {
                    field: *field,
                    direction: SortDirection::Ascending,
                });
            }
        }
        if ordering.iter().all(|key| key.field.name != table.id.name) {
            ordering.push(SortKey {
                field: table.id,
                direction: SortDirection::Ascending,
            });
        }

        debug!(
            stage = "specification",
            entity = table.entity,
            predicates = predicates.len(),
            sort_keys = ordering.len(),
            "specification built"
        );

        Specification {
            table,
            predicates,
            ordering,
            projection: filter.projection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use crate::filter::{Criterion, PaginationFilter, SearchFilter};
    use crate::validation::validate;

    const FIELDS: &[FieldDef] = &[
        FieldDef::new("name", "name", FieldKind::Text)
            .sortable()
            .searchable(),
        FieldDef::new("code", "code", FieldKind::Code).searchable(),
        FieldDef::new("placedAt", "placed_at", FieldKind::Timestamp).sortable(),
    ];
    static TABLE: FieldTable = FieldTable {
        entity: "order",
        source: "orders",
        id: FieldDef::new("id", "id", FieldKind::Uuid),
        default_sort: "name",
        fields: FIELDS,
    };

    struct OrderFilter {
        page: PaginationFilter,
        name: Option<String>,
        code: Option<String>,
        placed_from: Option<chrono::DateTime<chrono::Utc>>,
    }

    impl SearchFilter for OrderFilter {
        fn pagination(&self) -> &PaginationFilter {
            &self.page
        }

        fn criteria(&self) -> Vec<Criterion> {
            vec![
                Criterion::contains("name", self.name.clone()),
                Criterion::equals("code", self.code.clone()),
                Criterion::at_least("placedFrom", "placedAt", self.placed_from),
            ]
        }
    }

    fn build(filter: &OrderFilter) -> Specification {
        let validated = validate(filter, &TABLE).expect("valid filter");
        SpecificationBuilder::new(&TABLE).build(&validated)
    }

    fn empty_filter() -> OrderFilter {
        OrderFilter {
            page: PaginationFilter::default(),
            name: None,
            code: None,
            placed_from: None,
        }
    }

    #[test]
    fn absent_criteria_emit_no_clauses() {
        let spec = build(&empty_filter());
        assert!(spec.predicates().is_empty());
    }

    #[test]
    fn present_criteria_emit_one_clause_each_in_order() {
        let filter = OrderFilter {
            name: Some("Widget".into()),
            code: Some("WX-1".into()),
            ..empty_filter()
        };
        let spec = build(&filter);
        assert_eq!(spec.predicates().len(), 2);
        let Predicate::Clause(first) = &spec.predicates()[0] else {
            panic!("expected a clause");
        };
        assert_eq!(first.field.name, "name");
        assert_eq!(first.op, Operator::Contains);
        assert!(first.folds_case());
        let Predicate::Clause(second) = &spec.predicates()[1] else {
            panic!("expected a clause");
        };
        assert!(!second.folds_case());
    }

    #[test]
    fn lower_bound_alone_emits_single_clause() {
        let filter = OrderFilter {
            placed_from: Some(chrono::Utc::now()),
            ..empty_filter()
        };
        let spec = build(&filter);
        assert_eq!(spec.predicates().len(), 1);
        assert!(matches!(
            &spec.predicates()[0],
            Predicate::Clause(Clause { op: Operator::AtLeast, .. })
        ));
    }

    #[test]
    fn default_ordering_uses_table_default_then_identifier() {
        let spec = build(&empty_filter());
        let names: Vec<_> = spec.ordering().iter().map(|key| key.field.name).collect();
        assert_eq!(names, ["name", "id"]);
    }

    #[test]
    fn explicit_identifier_sort_is_not_duplicated() {
        let mut filter = empty_filter();
        filter.page.order_by = vec!["id desc".into()];
        let spec = build(&filter);
        assert_eq!(spec.ordering().len(), 1);
        assert_eq!(spec.ordering()[0].direction, SortDirection::Descending);
    }

    #[test]
    fn keyword_targets_searchable_fields() {
        let mut filter = empty_filter();
        filter.page.keyword = Some("  gear ".into());
        let spec = build(&filter);
        let Some(Predicate::Keyword { fields, term }) = spec.predicates().last() else {
            panic!("expected keyword predicate");
        };
        assert_eq!(term, "gear");
        let names: Vec<_> = fields.iter().map(|field| field.name).collect();
        assert_eq!(names, ["name", "code"]);
    }

    #[test]
    fn building_twice_is_deterministic() {
        let filter = OrderFilter {
            name: Some("Widget".into()),
            ..empty_filter()
        };
        assert_eq!(build(&filter), build(&filter));
    }

    #[test]
    fn by_id_matches_identifier_only() {
        let id = uuid::Uuid::new_v4();
        let spec = Specification::by_id(&TABLE, id);
        assert_eq!(
            spec.predicates(),
            [Predicate::Clause(Clause {
                field: TABLE.id,
                op: Operator::Equals,
                value: FieldValue::Uuid(id),
            })]
        );
    }
}
