//! Typed client for the registry HTTP API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::cache::KeyedCache;
use super::fetch::{
    fetch_bytes_with_retry, fetch_with_retry, HttpTransport, ReqwestTransport, RetryPolicy,
};
use super::persist::QueryPersister;
use super::storage::ClientStorage;
use super::{ClientConfig, ClientError};
use crate::export::EXPORT_FILENAME;
use crate::models::{Company, CompanyPage, SearchFilters};

/// A cached query result: either a page of search results or one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum QueryData {
    Page(CompanyPage),
    Company(Company),
}

/// Registry API client with cached list and detail lookups.
#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    retry: RetryPolicy,
    queries: KeyedCache<QueryData>,
    persister: Option<QueryPersister<QueryData>>,
}

impl RegistryClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::with_transport(config, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            transport,
            base_url: parse_base_url(&config.base_url)?,
            retry: config.retry,
            queries: KeyedCache::new(config.stale_time, config.gc_time),
            persister: None,
        })
    }

    /// Keep list and detail results in `storage` across restarts.
    ///
    /// Previously persisted results are loaded immediately. Persisted entries
    /// are retained for `persisted_max_age` instead of `gc_time`.
    pub fn with_persistence(mut self, config: &ClientConfig, storage: Arc<dyn ClientStorage>) -> Self {
        self.queries = KeyedCache::new(
            config.stale_time,
            config.gc_time.max(config.persisted_max_age),
        );
        let persister = QueryPersister::new(
            self.queries.clone(),
            storage,
            config.persisted_max_age,
            config.persist_throttle,
        );
        persister.restore();
        self.persister = Some(persister);
        self
    }

    pub fn queries(&self) -> &KeyedCache<QueryData> {
        &self.queries
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    /// URL of one page of search results. Unconstrained filters are left out.
    pub fn companies_url(
        &self,
        filters: &SearchFilters,
        page: u32,
        limit: u32,
    ) -> Result<Url, ClientError> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(limit);

        let mut url = self.endpoint("companies")?;
        url.query_pairs_mut()
            .extend_pairs(filters.to_query_pairs())
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    pub fn company_url(&self, id: &str) -> Result<Url, ClientError> {
        let mut url = self.endpoint("companies/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    pub fn export_url(&self, filters: &SearchFilters) -> Result<Url, ClientError> {
        let mut url = self.endpoint("export")?;
        let pairs = filters.to_query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Fetch one page straight from the server, bypassing the query cache.
    pub async fn fetch_companies(
        &self,
        filters: &SearchFilters,
        page: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<CompanyPage, ClientError> {
        let url = self.companies_url(filters, page, limit)?;
        fetch_with_retry(self.transport.as_ref(), url.as_str(), &self.retry, cancel).await
    }

    /// One page of search results, served from cache while fresh.
    pub async fn list_companies(
        &self,
        filters: &SearchFilters,
        page: u32,
        limit: u32,
    ) -> Result<CompanyPage, ClientError> {
        let key = format!("companies?{}", filters.cache_key(page, limit));
        let client = self.clone();
        let filters = filters.clone();

        let data = self
            .queries
            .get_or_fetch(&key, move || async move {
                client
                    .fetch_companies(&filters, page, limit, &CancellationToken::new())
                    .await
                    .map(QueryData::Page)
            })
            .await?;
        self.schedule_persist();

        match data {
            QueryData::Page(page) => Ok(page),
            QueryData::Company(_) => Err(unexpected_entry(&key)),
        }
    }

    /// One company by identifier. A 404 surfaces as [`ClientError::is_not_found`].
    pub async fn get_company(&self, id: &str) -> Result<Company, ClientError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ClientError::ClientRequest {
                status: 400,
                body: "Company ID is required".to_string(),
            });
        }

        let key = format!("company-detail/{}", id);
        let url = self.company_url(id)?;
        let transport = Arc::clone(&self.transport);
        let retry = self.retry;

        let data = self
            .queries
            .get_or_fetch(&key, move || async move {
                fetch_with_retry(transport.as_ref(), url.as_str(), &retry, &CancellationToken::new())
                    .await
                    .map(QueryData::Company)
            })
            .await?;
        self.schedule_persist();

        match data {
            QueryData::Company(company) => Ok(company),
            QueryData::Page(_) => Err(unexpected_entry(&key)),
        }
    }

    /// Download the CSV export for `filters` into `dir/companies.csv`.
    ///
    /// Exports are never cached or deduplicated.
    pub async fn export_csv(
        &self,
        filters: &SearchFilters,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let url = self.export_url(filters)?;
        let body = fetch_bytes_with_retry(
            self.transport.as_ref(),
            url.as_str(),
            &self.retry,
            &CancellationToken::new(),
        )
        .await?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(EXPORT_FILENAME);
        tokio::fs::write(&path, &body).await?;

        tracing::info!("Exported {} bytes to {:?}", body.len(), path);
        Ok(path)
    }

    fn schedule_persist(&self) {
        if let Some(persister) = &self.persister {
            persister.schedule_persist();
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let mut url =
        Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(raw.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn unexpected_entry(key: &str) -> ClientError {
    ClientError::Transient(format!("Unexpected cached data for {}", key))
}
