use chrono::{DateTime, Utc};
use uuid::Uuid;

use erp_search_core::{store::Supplier, DataSourceError};

use crate::query::{SqliteSource, TableRow};
use crate::{map_insert_error, to_rfc3339, InsertError};

/// Search source and writer for the `suppliers` table.
pub type SupplierRepository = SqliteSource<SupplierRow>;

#[derive(Debug, sqlx::FromRow)]
pub struct SupplierRow {
    pub id: String,
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

impl TableRow for SupplierRow {
    type Entity = Supplier;

    fn into_entity(self) -> Result<Supplier, DataSourceError> {
        let id = Uuid::parse_str(&self.id).map_err(|err| {
            DataSourceError::Backend(format!("invalid supplier id '{}': {err}", self.id))
        })?;
        Ok(Supplier {
            id,
            code: self.code,
            name: self.name,
            contact_person: self.contact_person,
            email: self.email,
            phone: self.phone,
            city: self.city,
            is_active: self.is_active,
            rating: self.rating,
            created_on: self.created_on,
        })
    }
}

impl SqliteSource<SupplierRow> {
    pub async fn insert(&self, supplier: &Supplier) -> Result<(), InsertError> {
        sqlx::query(
            "INSERT INTO suppliers \
             (id, code, name, contact_person, email, phone, city, is_active, rating, created_on) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(supplier.id.to_string())
        .bind(&supplier.code)
        .bind(&supplier.name)
        .bind(&supplier.contact_person)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(&supplier.city)
        .bind(supplier.is_active)
        .bind(supplier.rating)
        .bind(to_rfc3339(supplier.created_on))
        .execute(self.pool())
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }
}
