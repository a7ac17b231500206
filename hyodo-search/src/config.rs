//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] carries the API credentials, result count, query
//! suffix and request behaviour. It deserialises from the `[search]`
//! table of the host configuration file.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Largest `display` value accepted by the API.
const MAX_DISPLAY: usize = 100;

/// Configuration for a web search operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// API origin, without trailing slash.
    pub base_url: String,
    /// Value for the `X-Naver-Client-Id` header.
    pub client_id: String,
    /// Value for the `X-Naver-Client-Secret` header.
    pub client_secret: String,
    /// Number of documents to request.
    pub display: usize,
    /// Appended to every query to steer results towards senior welfare.
    pub query_suffix: String,
    /// Ranking mode passed as `sort` (`sim` or `date`).
    pub sort: String,
    /// HTTP request timeout in seconds.
    pub timeout_seconds: u64,
    /// How long to cache results in seconds. Set to 0 to disable caching.
    pub cache_ttl_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openapi.naver.com".to_owned(),
            client_id: String::new(),
            client_secret: String::new(),
            display: 3,
            query_suffix: " 노인 복지 혜택".to_owned(),
            sort: "sim".to_owned(),
            timeout_seconds: 5,
            cache_ttl_seconds: 600,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `display` must be between 1 and 100
    /// - `timeout_seconds` must be greater than 0
    /// - `sort` must be `sim` or `date`
    /// - both credentials must be present
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.display == 0 || self.display > MAX_DISPLAY {
            return Err(SearchError::Config(
                "display must be between 1 and 100".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.sort != "sim" && self.sort != "date" {
            return Err(SearchError::Config("sort must be `sim` or `date`".into()));
        }
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(SearchError::Config("client credentials are not set".into()));
        }
        Ok(())
    }

    /// Whether credentials are present so that a search can be attempted.
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}
