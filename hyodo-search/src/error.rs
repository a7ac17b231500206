//! Error types for the hyodo-search crate.
//!
//! Messages never include the client id or secret.

/// Errors that can occur while querying the search API.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("search timed out: {0}")]
    Timeout(String),

    /// The API rejected the configured credentials.
    #[error("credentials rejected: {0}")]
    Credentials(String),

    /// The response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for hyodo-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
