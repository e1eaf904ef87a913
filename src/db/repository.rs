//! SQLite-backed registry store.
//!
//! Every operation is a single filtered `SELECT` built with bound parameters.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::RegistryStore;
use crate::errors::AppError;
use crate::models::{Company, CompanyPage, CompanyQuery, SearchFilters};

const COMPANY_COLUMNS: &str = "id, name, register_name, business_name, abn, acn, status, state, \
     state_number, registration_date, cancellation_date, industry, registration_number, email, phone";

/// Registered name ascending, unnamed rows last, id as tie-breaker for stable paging.
const COMPANY_ORDER: &str = " ORDER BY register_name IS NULL, register_name, id";

/// Database repository for registry reads.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count companies matching the filters.
    pub async fn count_companies(&self, filters: &SearchFilters) -> Result<u64, AppError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM companies");
        push_filters(&mut builder, filters);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl RegistryStore for Repository {
    async fn search_companies(&self, query: &CompanyQuery) -> Result<CompanyPage, AppError> {
        let total = self.count_companies(&query.filters).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {COMPANY_COLUMNS} FROM companies"));
        push_filters(&mut builder, &query.filters);
        builder.push(COMPANY_ORDER);
        builder.push(" LIMIT ").push_bind(i64::from(query.limit));
        builder.push(" OFFSET ").push_bind(i64::from(query.offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let companies: Vec<Company> = rows.iter().map(company_from_row).collect();

        tracing::debug!(
            "Registry search matched {} companies, returning {} from offset {}",
            total,
            companies.len(),
            query.offset
        );

        Ok(CompanyPage::new(companies, total, query.limit))
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(company_from_row))
    }

    async fn export_companies(&self, filters: &SearchFilters) -> Result<Vec<Company>, AppError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {COMPANY_COLUMNS} FROM companies"));
        push_filters(&mut builder, filters);
        builder.push(COMPANY_ORDER);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(company_from_row).collect())
    }
}

/// Append the WHERE clause for the given filters. Unconstrained fields add nothing.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &SearchFilters) {
    builder.push(" WHERE 1 = 1");

    if let Some(query) = filters.query_constraint() {
        let pattern = like_pattern(query);
        builder
            .push(" AND (register_name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR business_name LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }

    if let Some(industry) = filters.industry.as_constraint() {
        builder
            .push(" AND industry LIKE ")
            .push_bind(like_pattern(industry))
            .push(" ESCAPE '\\'");
    }

    if let Some(state) = filters.state.as_constraint() {
        builder.push(" AND state = ").push_bind(state.to_string());
    }

    if let Some(status) = filters.status.as_constraint() {
        builder
            .push(" AND status = ")
            .push_bind(status.to_string())
            .push(" COLLATE NOCASE");
    }
}

/// Substring pattern for LIKE with wildcard characters in the input escaped.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn company_from_row(row: &SqliteRow) -> Company {
    Company {
        id: row.get("id"),
        name: row.get("name"),
        register_name: row.get("register_name"),
        business_name: row.get("business_name"),
        abn: row.get("abn"),
        acn: row.get("acn"),
        status: row.get("status"),
        state: row.get("state"),
        state_number: row.get("state_number"),
        registration_date: row.get("registration_date"),
        cancellation_date: row.get("cancellation_date"),
        industry: row.get("industry"),
        registration_number: row.get("registration_number"),
        email: row.get("email"),
        phone: row.get("phone"),
    }
}

/// Insert a registry row. The registry is loaded out of band in production;
/// tests use this to seed fixtures.
#[cfg(test)]
pub(crate) async fn insert_company(pool: &SqlitePool, company: &Company) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO companies ({COMPANY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&company.id)
    .bind(&company.name)
    .bind(&company.register_name)
    .bind(&company.business_name)
    .bind(&company.abn)
    .bind(&company.acn)
    .bind(&company.status)
    .bind(&company.state)
    .bind(&company.state_number)
    .bind(&company.registration_date)
    .bind(&company.cancellation_date)
    .bind(&company.industry)
    .bind(&company.registration_number)
    .bind(&company.email)
    .bind(&company.phone)
    .execute(pool)
    .await?;
    Ok(())
}
