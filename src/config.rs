//! Collaborator connection configuration
//!
//! Values are read from the process environment, after loading a `.env` file
//! when one exists:
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `SUPABASE_URL` | project base URL | required |
//! | `SUPABASE_ANON_KEY` | anon/service API key | required |
//! | `SAYSO_MAX_CONNECTIONS` | pooled client handles | 16 |
//! | `SAYSO_REQUEST_TIMEOUT_MS` | per-request HTTP timeout | 10000 |

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{FetchError, Result};

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_API_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_MAX_CONNECTIONS: &str = "SAYSO_MAX_CONNECTIONS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SAYSO_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Project base URL, without the `/rest/v1` suffix
    pub url: String,

    /// API key sent as `apikey` and, absent a user token, as the bearer token
    pub api_key: String,

    /// Number of client handles kept in the pool
    pub max_connections: usize,

    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            max_connections: 16,
            request_timeout: Duration::from_millis(10_000),
        }
    }

    /// Load from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_URL).ok_or_else(|| FetchError::Config(format!("{} is not set", ENV_URL)))?;
        let api_key = lookup(ENV_API_KEY).ok_or_else(|| FetchError::Config(format!("{} is not set", ENV_API_KEY)))?;

        let mut config = Self::new(url, api_key);

        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = raw
                .parse()
                .map_err(|_| FetchError::Config(format!("{} must be an integer, got {:?}", ENV_MAX_CONNECTIONS, raw)))?;
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms: u64 = raw
                .parse()
                .map_err(|_| FetchError::Config(format!("{} must be an integer, got {:?}", ENV_REQUEST_TIMEOUT_MS, raw)))?;
            config.request_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(FetchError::Config(format!("url must be http(s), got {:?}", self.url)));
        }

        if self.api_key.trim().is_empty() {
            return Err(FetchError::Config("api_key must not be empty".to_string()));
        }

        if self.max_connections == 0 {
            return Err(FetchError::Config("max_connections must be greater than 0".to_string()));
        }

        if self.request_timeout.is_zero() {
            return Err(FetchError::Config("request_timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// `{url}/rest/v1`
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url.trim_end_matches('/'))
    }
}
