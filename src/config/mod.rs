//! Configuration module for the registry backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Default page size when a request does not specify `limit`.
pub const DEFAULT_LIMIT: u32 = 20;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection details for a hosted registry table.
#[derive(Debug, Clone)]
pub struct RemoteRegistryConfig {
    pub url: String,
    pub api_key: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite registry database
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Hosted registry; when set it replaces the local database
    pub remote: Option<RemoteRegistryConfig>,
    /// Page size used when `limit` is absent
    pub default_limit: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("REGISTRY_DB_PATH")
            .unwrap_or_else(|_| "./data/registry.sqlite".to_string())
            .into();

        let bind_raw =
            env::var("REGISTRY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                key: "REGISTRY_BIND_ADDR",
                value: bind_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let log_level = env::var("REGISTRY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let remote = match (
            env::var("REGISTRY_REMOTE_URL").ok(),
            env::var("REGISTRY_REMOTE_KEY").ok(),
        ) {
            (Some(url), Some(api_key)) if !url.trim().is_empty() => {
                Some(RemoteRegistryConfig { url, api_key })
            }
            _ => None,
        };

        let default_limit = match env::var("REGISTRY_DEFAULT_LIMIT") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "REGISTRY_DEFAULT_LIMIT",
                        value: raw,
                        reason: "expected a positive integer".to_string(),
                    })
                }
            },
            Err(_) => DEFAULT_LIMIT,
        };

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            remote,
            default_limit,
        })
    }
}
