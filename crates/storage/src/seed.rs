//! Deterministic demo data for local development and tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use erp_search_core::{
    accounting::{Check, CHECK_STATUSES},
    store::Supplier,
};

const CHECK_ID_BASE: u128 = 0x0c4e_c000_0000_4000_8000_0000_0000_0000;
const SUPPLIER_ID_BASE: u128 = 0x5a99_1100_0000_4000_8000_0000_0000_0000;

const PAYEES: &[&str] = &[
    "Acme Office Supply",
    "Northwind Traders",
    "acme logistics",
    "Blue Harbor Utilities",
    "Pacific Paper Co.",
];

const SUPPLIERS: &[(&str, &str, Option<&str>, Option<&str>, bool, Option<f64>)] = &[
    ("SUP-001", "Acme Office Supply", Some("Dana Cruz"), Some("Manila"), true, Some(4.5)),
    ("SUP-002", "Northwind Traders", Some("Lee Tan"), Some("Cebu"), true, Some(3.8)),
    ("SUP-003", "Blue Harbor Utilities", None, Some("Davao"), false, Some(2.9)),
    ("SUP-004", "Pacific Paper Co.", Some("Ana Reyes"), Some("manila"), true, None),
    ("SUP-005", "Evergreen Farms", Some("Jo Lim"), None, true, Some(4.9)),
    ("SUP-006", "northern lights electrical", None, Some("Baguio"), true, Some(3.1)),
    ("SUP-007", "Summit Hardware", Some("Ray Gomez"), Some("Cebu"), false, Some(1.5)),
    ("SUP-008", "Coastal Freight", Some("Mia Santos"), Some("Iloilo"), true, Some(4.0)),
    ("SUP-009", "Golden Grain Mills", None, Some("Manila"), true, Some(3.5)),
    ("SUP-010", "Metro Cleaning Services", Some("Ben Ong"), Some("Makati"), true, Some(2.2)),
    ("SUP-011", "Island Printing", Some("Ivy Chua"), Some("Cebu"), true, Some(4.2)),
    ("SUP-012", "Acme Logistics", Some("Sam Uy"), Some("Davao"), false, None),
];

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Twenty-five checks spread across every status and two bank accounts.
pub fn demo_checks() -> Vec<Check> {
    (1..=25u32)
        .map(|index| {
            let status = CHECK_STATUSES[index as usize % CHECK_STATUSES.len()];
            let available = status == "Available";
            let bank_account_code = if index % 3 == 0 { "1020" } else { "1010" };
            let bank_name = if index % 3 == 0 {
                "Harbor Savings"
            } else {
                "Metro Commercial Bank"
            };
            Check {
                id: Uuid::from_u128(CHECK_ID_BASE | u128::from(index)),
                check_number: format!("{:06}", 100_100 + index),
                bank_account_code: bank_account_code.to_string(),
                bank_name: Some(bank_name.to_string()),
                status: status.to_string(),
                amount: (!available).then(|| f64::from(index) * 125.5),
                payee_name: (!available)
                    .then(|| PAYEES[index as usize % PAYEES.len()].to_string()),
                issued_date: (!available).then(|| epoch() + Duration::days(i64::from(index))),
                is_printed: !available,
                is_stop_payment: status == "StopPayment",
                memo: (index % 4 == 0).then(|| format!("Batch {} disbursement", index / 4)),
            }
        })
        .collect()
}

/// Twelve suppliers with mixed casing, missing cities and missing ratings.
pub fn demo_suppliers() -> Vec<Supplier> {
    SUPPLIERS
        .iter()
        .enumerate()
        .map(
            |(offset, &(code, name, contact_person, city, is_active, rating))| {
                let index = offset as u32 + 1;
                Supplier {
                    id: Uuid::from_u128(SUPPLIER_ID_BASE | u128::from(index)),
                    code: code.to_string(),
                    name: name.to_string(),
                    contact_person: contact_person.map(str::to_string),
                    email: Some(format!("orders@{}.example", code.to_ascii_lowercase())),
                    phone: (index % 2 == 1).then(|| format!("+63 2 8555 {:04}", index)),
                    city: city.map(str::to_string),
                    is_active,
                    rating,
                    created_on: epoch() + Duration::days(i64::from(index) * 7),
                }
            },
        )
        .collect()
}
