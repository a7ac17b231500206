//! Shared HTTP client for search API requests.

use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::SearchError;

/// Identifies this client to the API operator.
const USER_AGENT: &str = concat!("hyodo-search/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] with the configured timeout.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}
