//! Accounting module entities and their search filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::{FieldDef, FieldKind, FieldTable, FieldValue};
use crate::filter::{Criterion, PaginationFilter, SearchFilter};
use crate::memory::Record;

pub const CHECK_STATUSES: &[&str] = &[
    "Available",
    "Issued",
    "Cleared",
    "Void",
    "StopPayment",
    "Stale",
];

const CHECK_FIELDS: &[FieldDef] = &[
    FieldDef::new("checkNumber", "check_number", FieldKind::Code)
        .max_len(50)
        .sortable()
        .searchable(),
    FieldDef::new("bankAccountCode", "bank_account_code", FieldKind::Code)
        .max_len(50)
        .sortable(),
    FieldDef::new("bankName", "bank_name", FieldKind::Text)
        .max_len(256)
        .sortable(),
    FieldDef::new("status", "status", FieldKind::Enum(CHECK_STATUSES)).sortable(),
    FieldDef::new("amount", "amount", FieldKind::Decimal).sortable(),
    FieldDef::new("payeeName", "payee_name", FieldKind::Text)
        .max_len(256)
        .sortable()
        .searchable(),
    FieldDef::new("issuedDate", "issued_date", FieldKind::Timestamp).sortable(),
    FieldDef::new("isPrinted", "is_printed", FieldKind::Boolean),
    FieldDef::new("isStopPayment", "is_stop_payment", FieldKind::Boolean),
    FieldDef::new("memo", "memo", FieldKind::Text)
        .max_len(2048)
        .searchable(),
];

/// Field table for [`Check`].
pub static CHECKS: FieldTable = FieldTable {
    entity: "check",
    source: "checks",
    id: FieldDef::new("id", "id", FieldKind::Uuid),
    default_sort: "checkNumber",
    fields: CHECK_FIELDS,
};

/// A pre-printed check tracked from registration through clearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: Uuid,
    pub check_number: String,
    pub bank_account_code: String,
    pub bank_name: Option<String>,
    pub status: String,
    pub amount: Option<f64>,
    pub payee_name: Option<String>,
    pub issued_date: Option<DateTime<Utc>>,
    pub is_printed: bool,
    pub is_stop_payment: bool,
    pub memo: Option<String>,
}

impl Record for Check {
    fn value(&self, field: &str) -> FieldValue {
        match field {
            "id" => self.id.into(),
            "checkNumber" => self.check_number.as_str().into(),
            "bankAccountCode" => self.bank_account_code.as_str().into(),
            "bankName" => self.bank_name.clone().into(),
            "status" => self.status.as_str().into(),
            "amount" => self.amount.into(),
            "payeeName" => self.payee_name.clone().into(),
            "issuedDate" => self.issued_date.into(),
            "isPrinted" => self.is_printed.into(),
            "isStopPayment" => self.is_stop_payment.into(),
            "memo" => self.memo.clone().into(),
            _ => FieldValue::Null,
        }
    }
}

/// Search parameters for checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSearchFilter {
    #[serde(flatten)]
    pub page: PaginationFilter,
    #[serde(default)]
    pub check_number: Option<String>,
    #[serde(default)]
    pub bank_account_code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payee_name: Option<String>,
    #[serde(default)]
    pub issued_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub amount_min: Option<f64>,
    #[serde(default)]
    pub amount_max: Option<f64>,
    #[serde(default)]
    pub is_printed: Option<bool>,
    #[serde(default)]
    pub is_stop_payment: Option<bool>,
}

impl SearchFilter for CheckSearchFilter {
    fn pagination(&self) -> &PaginationFilter {
        &self.page
    }

    fn criteria(&self) -> Vec<Criterion> {
        vec![
            Criterion::equals("checkNumber", self.check_number.clone()),
            Criterion::equals("bankAccountCode", self.bank_account_code.clone()),
            Criterion::equals("status", self.status.clone()),
            Criterion::contains("payeeName", self.payee_name.clone()),
            Criterion::at_least("issuedFrom", "issuedDate", self.issued_from),
            Criterion::at_most("issuedTo", "issuedDate", self.issued_to),
            Criterion::at_least("amountMin", "amount", self.amount_min),
            Criterion::at_most("amountMax", "amount", self.amount_max),
            Criterion::equals("isPrinted", self.is_printed),
            Criterion::equals("isStopPayment", self.is_stop_payment),
        ]
    }
}
