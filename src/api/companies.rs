//! Company search and detail endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{ApiResult, MAX_PAGE_LIMIT};
use crate::errors::AppError;
use crate::models::{Company, CompanyPage, CompanyQuery, SearchFilters};
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CompanySearchParams {
    /// Substring to match against company names.
    #[serde(default, alias = "query")]
    pub q: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Page size (default from configuration, at most 100).
    #[serde(default)]
    pub limit: Option<u32>,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: Option<u32>,
}

impl CompanySearchParams {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters::from_params(
            self.q.as_deref(),
            self.industry.as_deref(),
            self.state.as_deref(),
            self.status.as_deref(),
        )
    }
}

/// GET /api/companies - Search companies.
pub async fn list_companies(
    State(state): State<AppState>,
    Query(params): Query<CompanySearchParams>,
) -> ApiResult<Json<CompanyPage>> {
    let limit = params
        .limit
        .unwrap_or(state.config.default_limit)
        .clamp(1, MAX_PAGE_LIMIT);

    let query = CompanyQuery {
        filters: params.filters(),
        limit,
        offset: params.offset.unwrap_or(0),
    };

    let page = state.store.search_companies(&query).await?;
    tracing::debug!(
        "Search {:?} returned {} of {} companies",
        query.filters,
        page.companies.len(),
        page.total
    );

    Ok(Json(page))
}

/// GET /api/companies/:id - Get a single company.
pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Company>> {
    let id = id.trim();
    if id.is_empty() {
        return Err(missing_id());
    }

    match state.store.get_company(id).await? {
        Some(company) => Ok(Json(company)),
        None => Err(AppError::NotFound("Company not found".to_string())),
    }
}

/// GET /api/companies/ - Detail route hit without an identifier.
pub async fn missing_company_id() -> AppError {
    missing_id()
}

fn missing_id() -> AppError {
    AppError::BadRequest("Company ID is required".to_string())
}
