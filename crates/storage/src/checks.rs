use chrono::{DateTime, Utc};
use uuid::Uuid;

use erp_search_core::{accounting::Check, DataSourceError};

use crate::query::{SqliteSource, TableRow};
use crate::{map_insert_error, to_rfc3339, InsertError};

/// Search source and writer for the `checks` table.
pub type CheckRepository = SqliteSource<CheckRow>;

#[derive(Debug, sqlx::FromRow)]
pub struct CheckRow {
    pub id: String,
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

impl TableRow for CheckRow {
    type Entity = Check;

    fn into_entity(self) -> Result<Check, DataSourceError> {
        let id = Uuid::parse_str(&self.id).map_err(|err| {
            DataSourceError::Backend(format!("invalid check id '{}': {err}", self.id))
        })?;
        Ok(Check {
            id,
            check_number: self.check_number,
            bank_account_code: self.bank_account_code,
            bank_name: self.bank_name,
            status: self.status,
            amount: self.amount,
            payee_name: self.payee_name,
            issued_date: self.issued_date,
            is_printed: self.is_printed,
            is_stop_payment: self.is_stop_payment,
            memo: self.memo,
        })
    }
}

impl SqliteSource<CheckRow> {
    pub async fn insert(&self, check: &Check) -> Result<(), InsertError> {
        sqlx::query(
            "INSERT INTO checks \
             (id, check_number, bank_account_code, bank_name, status, amount, payee_name, issued_date, is_printed, is_stop_payment, memo) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(check.id.to_string())
        .bind(&check.check_number)
        .bind(&check.bank_account_code)
        .bind(&check.bank_name)
        .bind(&check.status)
        .bind(check.amount)
        .bind(&check.payee_name)
        .bind(check.issued_date.map(to_rfc3339))
        .bind(check.is_printed)
        .bind(check.is_stop_payment)
        .bind(&check.memo)
        .execute(self.pool())
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }
}
