pub mod checks;
pub mod query;
pub mod seed;
pub mod suppliers;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tracing::info;

pub use checks::{CheckRepository, CheckRow};
pub use query::{SqliteSource, TableRow};
pub use suppliers::{SupplierRepository, SupplierRow};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns the search source for accounting checks.
    pub fn checks(&self) -> CheckRepository {
        SqliteSource::new(self.pool.clone())
    }

    /// Returns the search source for store suppliers.
    pub fn suppliers(&self) -> SupplierRepository {
        SqliteSource::new(self.pool.clone())
    }

    /// Inserts the demo data set into empty tables. Tables that already hold rows are left alone.
    pub async fn seed_demo(&self) -> Result<SeedOutcome, StorageError> {
        let mut outcome = SeedOutcome::default();

        if self.is_empty("checks").await? {
            let repo = self.checks();
            for check in seed::demo_checks() {
                repo.insert(&check).await?;
                outcome.checks += 1;
            }
        }

        if self.is_empty("suppliers").await? {
            let repo = self.suppliers();
            for supplier in seed::demo_suppliers() {
                repo.insert(&supplier).await?;
                outcome.suppliers += 1;
            }
        }

        info!(
            stage = "storage",
            checks = outcome.checks,
            suppliers = outcome.suppliers,
            "demo data seeded"
        );
        Ok(outcome)
    }

    async fn is_empty(&self, table: &'static str) -> Result<bool, StorageError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table})");
        let exists: bool = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(!exists)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("failed to insert demo row: {0}")]
    Seed(#[from] InsertError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors that can occur while inserting an entity row.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("a row with the same identifier or unique key already exists")]
    Duplicate,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

pub(crate) fn map_insert_error(err: sqlx::Error) -> InsertError {
    match err {
        sqlx::Error::Database(db_err) => {
            if matches!(db_err.code().as_deref(), Some("1555") | Some("2067")) {
                InsertError::Duplicate
            } else {
                InsertError::Database(sqlx::Error::Database(db_err))
            }
        }
        other => InsertError::Database(other),
    }
}

/// Rows inserted by [`Database::seed_demo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub checks: u32,
    pub suppliers: u32,
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
