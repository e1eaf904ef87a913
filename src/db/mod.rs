//! Registry store module.
//!
//! The registry is populated out of band; this system only ever reads from it.
//! A local SQLite database and a hosted PostgREST table service are supported
//! behind the same [`RegistryStore`] trait.

mod remote;
mod repository;

pub use remote::*;
pub use repository::*;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::errors::AppError;
use crate::models::{Company, CompanyPage, CompanyQuery, SearchFilters};

/// Read access to the `companies` table.
///
/// Filter semantics are identical across operations: the query text is a
/// case-insensitive substring match on registered or business name, industry
/// is a case-insensitive substring match, state is an exact match and status
/// a case-insensitive exact match. Unconstrained fields are not filtered.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// One page of matching companies, ordered by registered name, plus the total match count.
    async fn search_companies(&self, query: &CompanyQuery) -> Result<CompanyPage, AppError>;

    /// A single company by identifier.
    async fn get_company(&self, id: &str) -> Result<Option<Company>, AppError>;

    /// Every matching company, ordered by registered name, without pagination.
    async fn export_companies(&self, filters: &SearchFilters) -> Result<Vec<Company>, AppError>;
}

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Create the registry table if it does not exist yet.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT,
            register_name TEXT,
            business_name TEXT,
            abn TEXT,
            acn TEXT,
            status TEXT,
            state TEXT,
            state_number TEXT,
            registration_date TEXT,
            cancellation_date TEXT,
            industry TEXT,
            registration_number TEXT,
            email TEXT,
            phone TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_companies_register_name ON companies(register_name);
        CREATE INDEX IF NOT EXISTS idx_companies_state ON companies(state);
        CREATE INDEX IF NOT EXISTS idx_companies_status ON companies(status);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
