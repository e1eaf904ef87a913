//! CSV export endpoint.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;

use super::ApiResult;
use crate::export::{content_disposition, render_csv, CSV_CONTENT_TYPE};
use crate::models::SearchFilters;
use crate::AppState;

/// Export query parameters. Pagination parameters are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(default, alias = "query")]
    pub q: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ExportParams {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters::from_params(
            self.q.as_deref(),
            self.industry.as_deref(),
            self.state.as_deref(),
            self.status.as_deref(),
        )
    }
}

/// GET /api/export - Download every matching company as CSV.
pub async fn export_companies(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<impl IntoResponse> {
    let filters = params.filters();
    let companies = state.store.export_companies(&filters).await?;
    tracing::info!("Exporting {} companies for {:?}", companies.len(), filters);

    Ok((
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition()),
        ],
        render_csv(&companies),
    ))
}
