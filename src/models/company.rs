//! Company record model matching the `companies` registry table.

use serde::{Deserialize, Serialize};

use super::SearchFilters;

/// A company as stored in the registry. Read-only from this system's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub register_name: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    /// Tax identifier
    #[serde(default)]
    pub abn: Option<String>,
    /// Secondary registration identifier
    #[serde(default)]
    pub acn: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Jurisdiction code (NSW, VIC, ...)
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_number: Option<String>,
    #[serde(default)]
    pub registration_date: Option<String>,
    #[serde(default)]
    pub cancellation_date: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Company {
    /// Create a record carrying only its identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            register_name: None,
            business_name: None,
            abn: None,
            acn: None,
            status: None,
            state: None,
            state_number: None,
            registration_date: None,
            cancellation_date: None,
            industry: None,
            registration_number: None,
            email: None,
            phone: None,
        }
    }

    /// Best available name for display: registered name, then trading name.
    pub fn display_name(&self) -> &str {
        self.register_name
            .as_deref()
            .or(self.business_name.as_deref())
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A filtered, paginated registry query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyQuery {
    pub filters: SearchFilters,
    pub limit: u32,
    pub offset: u32,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPage {
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}

impl CompanyPage {
    /// Build a page; `has_more` is set when the page came back full.
    pub fn new(companies: Vec<Company>, total: u64, limit: u32) -> Self {
        let has_more = companies.len() == limit as usize;
        Self {
            companies,
            total,
            has_more,
        }
    }

    pub fn empty() -> Self {
        Self {
            companies: Vec::new(),
            total: 0,
            has_more: false,
        }
    }
}
