//! Store module entities and their search filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::{FieldDef, FieldKind, FieldTable, FieldValue};
use crate::filter::{Criterion, PaginationFilter, SearchFilter};
use crate::memory::Record;

const SUPPLIER_FIELDS: &[FieldDef] = &[
    FieldDef::new("code", "code", FieldKind::Code)
        .max_len(50)
        .sortable()
        .searchable(),
    FieldDef::new("name", "name", FieldKind::Text)
        .max_len(256)
        .sortable()
        .searchable(),
    FieldDef::new("contactPerson", "contact_person", FieldKind::Text)
        .max_len(100)
        .searchable(),
    FieldDef::new("email", "email", FieldKind::Text)
        .max_len(256)
        .searchable(),
    FieldDef::new("phone", "phone", FieldKind::Text).max_len(50),
    FieldDef::new("city", "city", FieldKind::Text)
        .max_len(100)
        .sortable(),
    FieldDef::new("isActive", "is_active", FieldKind::Boolean),
    FieldDef::new("rating", "rating", FieldKind::Decimal).sortable(),
    FieldDef::new("createdOn", "created_on", FieldKind::Timestamp).sortable(),
];

/// Field table for [`Supplier`].
pub static SUPPLIERS: FieldTable = FieldTable {
    entity: "supplier",
    source: "suppliers",
    id: FieldDef::new("id", "id", FieldKind::Uuid),
    default_sort: "name",
    fields: SUPPLIER_FIELDS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub is_active: bool,
    pub rating: Option<f64>,
    pub created_on: DateTime<Utc>,
}

impl Record for Supplier {
    fn value(&self, field: &str) -> FieldValue {
        match field {
            "id" => self.id.into(),
            "code" => self.code.as_str().into(),
            "name" => self.name.as_str().into(),
            "contactPerson" => self.contact_person.clone().into(),
            "email" => self.email.clone().into(),
            "phone" => self.phone.clone().into(),
            "city" => self.city.clone().into(),
            "isActive" => self.is_active.into(),
            "rating" => self.rating.into(),
            "createdOn" => self.created_on.into(),
            _ => FieldValue::Null,
        }
    }
}

/// Search parameters for suppliers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierSearchFilter {
    #[serde(flatten)]
    pub page: PaginationFilter,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub rating_min: Option<f64>,
    #[serde(default)]
    pub rating_max: Option<f64>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
}

impl SearchFilter for SupplierSearchFilter {
    fn pagination(&self) -> &PaginationFilter {
        &self.page
    }

    fn criteria(&self) -> Vec<Criterion> {
        vec![
            Criterion::equals("code", self.code.clone()),
            Criterion::contains("name", self.name.clone()),
            Criterion::equals("city", self.city.clone()),
            Criterion::equals("isActive", self.is_active),
            Criterion::at_least("ratingMin", "rating", self.rating_min),
            Criterion::at_most("ratingMax", "rating", self.rating_max),
            Criterion::at_least("createdFrom", "createdOn", self.created_from),
            Criterion::at_most("createdTo", "createdOn", self.created_to),
        ]
    }
}
