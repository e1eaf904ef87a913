//! Hosted registry store reached over a PostgREST-compatible REST surface.

use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use super::RegistryStore;
use crate::errors::AppError;
use crate::models::{Company, CompanyPage, CompanyQuery, SearchFilters};

const TABLE_PATH: &str = "rest/v1/companies";
const ORDER_BY_NAME: &str = "register_name.asc.nullslast,id.asc";

/// Registry store backed by a hosted `companies` table.
#[derive(Clone)]
pub struct PostgrestRegistry {
    http: Client,
    table_url: Url,
    api_key: String,
}

impl PostgrestRegistry {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, AppError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| AppError::Internal(format!("Invalid registry URL {}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let table_url = base
            .join(TABLE_PATH)
            .map_err(|e| AppError::Internal(format!("Invalid registry URL {}: {}", base_url, e)))?;

        Ok(Self {
            http: Client::new(),
            table_url,
            api_key: api_key.into(),
        })
    }

    fn request(&self, params: &[(String, String)]) -> RequestBuilder {
        self.http
            .get(self.table_url.clone())
            .query(params)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl RegistryStore for PostgrestRegistry {
    async fn search_companies(&self, query: &CompanyQuery) -> Result<CompanyPage, AppError> {
        let mut params = base_params();
        params.extend(filter_params(&query.filters));
        params.push(("limit".to_string(), query.limit.to_string()));
        params.push(("offset".to_string(), query.offset.to_string()));

        let response = self
            .request(&params)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let (companies, total) = read_rows(response).await?;
        let total = total.unwrap_or(u64::from(query.offset) + companies.len() as u64);

        Ok(CompanyPage::new(companies, total, query.limit))
    }

    async fn get_company(&self, id: &str) -> Result<Option<Company>, AppError> {
        let params = vec![
            ("select".to_string(), "*".to_string()),
            ("id".to_string(), format!("eq.{}", id)),
            ("limit".to_string(), "1".to_string()),
        ];

        let response = self.request(&params).send().await?;
        let (companies, _) = read_rows(response).await?;
        Ok(companies.into_iter().next())
    }

    async fn export_companies(&self, filters: &SearchFilters) -> Result<Vec<Company>, AppError> {
        let mut params = base_params();
        params.extend(filter_params(filters));

        let response = self.request(&params).send().await?;
        let (companies, _) = read_rows(response).await?;
        Ok(companies)
    }
}

fn base_params() -> Vec<(String, String)> {
    vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), ORDER_BY_NAME.to_string()),
    ]
}

/// PostgREST filter parameters. Unconstrained fields produce no parameter.
///
/// Text filters use `imatch` (case-insensitive POSIX regex) on an escaped
/// value, so `*`, `%` and `_` typed by the user match literally.
pub(crate) fn filter_params(filters: &SearchFilters) -> Vec<(String, String)> {
    let mut params = Vec::new();

    if let Some(query) = filters.query_constraint() {
        let pattern = quoted(&regex_literal(query));
        params.push((
            "or".to_string(),
            format!(
                "(register_name.imatch.{},business_name.imatch.{})",
                pattern, pattern
            ),
        ));
    }
    if let Some(industry) = filters.industry.as_constraint() {
        params.push(("industry".to_string(), format!("imatch.{}", regex_literal(industry))));
    }
    if let Some(state) = filters.state.as_constraint() {
        params.push(("state".to_string(), format!("eq.{}", state)));
    }
    if let Some(status) = filters.status.as_constraint() {
        params.push(("status".to_string(), format!("imatch.^{}$", regex_literal(status))));
    }

    params
}

/// Regex matching `value` literally as a substring.
fn regex_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        if ch.is_ascii_punctuation() {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Double-quoted value, safe inside PostgREST logic trees.
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Total row count from a `Content-Range` header such as `0-11/15` or `*/0`.
pub(crate) fn parse_content_range(header: &str) -> Option<u64> {
    header
        .split_once('/')
        .and_then(|(_, total)| total.trim().parse().ok())
}

async fn read_rows(response: Response) -> Result<(Vec<Company>, Option<u64>), AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Upstream(format!(
            "registry returned {}: {}",
            status, body
        )));
    }

    let total = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range);

    let body = response.bytes().await?;
    let companies: Vec<Company> = serde_json::from_slice(&body)?;
    Ok((companies, total))
}
