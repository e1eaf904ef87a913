//! Search filter model shared by the HTTP surface, the stores and the client.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel meaning "do not constrain this field".
pub const ALL: &str = "all";

/// A single filter field: either unconstrained or pinned to a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FilterValue {
    #[default]
    All,
    Only(String),
}

impl FilterValue {
    /// Parse a raw parameter. Absent, blank and `all` (any case) are unconstrained.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => FilterValue::All,
            Some(value) if value.eq_ignore_ascii_case(ALL) => FilterValue::All,
            Some(value) => FilterValue::Only(value.to_string()),
        }
    }

    pub fn only(value: impl Into<String>) -> Self {
        FilterValue::parse(Some(&value.into()))
    }

    /// The value to constrain the store with, never the sentinel.
    pub fn as_constraint(&self) -> Option<&str> {
        match self {
            FilterValue::All => None,
            FilterValue::Only(value) => Some(value),
        }
    }

    /// Parameter form used in cache keys and persisted state.
    pub fn as_param(&self) -> &str {
        self.as_constraint().unwrap_or(ALL)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FilterValue::All)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_param())
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(FilterValue::parse(raw.as_deref()))
    }
}

/// The (query, industry, state, status) tuple constraining a search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub industry: FilterValue,
    #[serde(default)]
    pub state: FilterValue,
    #[serde(default)]
    pub status: FilterValue,
}

impl SearchFilters {
    /// Build filters from raw request parameters.
    pub fn from_params(
        query: Option<&str>,
        industry: Option<&str>,
        state: Option<&str>,
        status: Option<&str>,
    ) -> Self {
        Self {
            query: query.map(str::trim).unwrap_or_default().to_string(),
            industry: FilterValue::parse(industry),
            state: FilterValue::parse(state),
            status: FilterValue::parse(status),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Text to match against company names; `None` matches everything.
    pub fn query_constraint(&self) -> Option<&str> {
        let trimmed = self.query.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Request parameters for the HTTP surface. Unconstrained fields are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(query) = self.query_constraint() {
            pairs.push(("q", query.to_string()));
        }
        let fields = [
            ("industry", &self.industry),
            ("state", &self.state),
            ("status", &self.status),
        ];
        for (name, value) in fields {
            if let Some(constraint) = value.as_constraint() {
                pairs.push((name, constraint.to_string()));
            }
        }
        pairs
    }

    /// Canonical, order-independent key for the filter plus pagination.
    pub fn cache_key(&self, page: u32, limit: u32) -> String {
        let mut params = BTreeMap::new();
        params.insert("q", self.query.trim().to_string());
        params.insert("industry", self.industry.as_param().to_string());
        params.insert("state", self.state.as_param().to_string());
        params.insert("status", self.status.as_param().to_string());
        params.insert("page", page.to_string());
        params.insert("limit", limit.to_string());

        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_parsing() {
        assert_eq!(FilterValue::parse(None), FilterValue::All);
        assert_eq!(FilterValue::parse(Some("")), FilterValue::All);
        assert_eq!(FilterValue::parse(Some("ALL")), FilterValue::All);
        assert_eq!(
            FilterValue::parse(Some(" NSW ")),
            FilterValue::Only("NSW".to_string())
        );
    }

    #[test]
    fn test_all_is_never_a_query_pair() {
        let values = [FilterValue::All, FilterValue::only("all"), FilterValue::only("VIC")];
        for industry in &values {
            for state in &values {
                for status in &values {
                    let filters = SearchFilters {
                        query: String::new(),
                        industry: industry.clone(),
                        state: state.clone(),
                        status: status.clone(),
                    };
                    for (_, value) in filters.to_query_pairs() {
                        assert!(!value.eq_ignore_ascii_case(ALL));
                    }
                }
            }
        }
    }

    #[test]
    fn test_query_pairs_skip_blank_query() {
        let filters = SearchFilters::from_params(Some("  "), Some("Retail"), None, Some("all"));
        assert_eq!(
            filters.to_query_pairs(),
            vec![("industry", "Retail".to_string())]
        );
    }

    #[test]
    fn test_cache_key_covers_every_field() {
        let base = SearchFilters::default().with_query("acme");
        let key = base.cache_key(1, 12);
        assert_eq!(
            key,
            "industry=all&limit=12&page=1&q=acme&state=all&status=all"
        );

        let mut by_state = base.clone();
        by_state.state = FilterValue::only("NSW");
        assert_ne!(by_state.cache_key(1, 12), key);
        assert_ne!(base.cache_key(2, 12), key);
    }

    #[test]
    fn test_filters_roundtrip_through_json() {
        let filters = SearchFilters::from_params(Some("acme"), None, Some("QLD"), None);
        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(json["industry"], "all");
        assert_eq!(json["state"], "QLD");

        let restored: SearchFilters = serde_json::from_value(json).unwrap();
        assert_eq!(restored, filters);
    }
}
