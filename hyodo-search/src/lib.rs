//! # hyodo-search
//!
//! Welfare and benefit lookup for Hyodo, backed by the Naver web document
//! search Open API.
//!
//! ## Design
//!
//! - Every query is suffixed (by default with " 노인 복지 혜택") to steer
//!   results towards programmes for seniors
//! - Highlight markup and HTML entities are removed from titles and descriptions
//! - In-memory cache with configurable TTL
//! - [`search_or_empty`] never fails: errors are logged and an empty list returned
//!
//! ## Security
//!
//! - Credentials are sent only as request headers and never logged
//! - Search queries are logged only at trace level

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod naver;
pub mod types;

pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use types::SearchResult;

/// Search the web for `query` (the configured suffix is appended).
///
/// # Errors
///
/// Returns [`SearchError::Config`] for an invalid configuration, and the
/// transport or decoding error when the request fails.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> hyodo_search::Result<()> {
/// let config = hyodo_search::SearchConfig {
///     client_id: "id".into(),
///     client_secret: "secret".into(),
///     ..Default::default()
/// };
/// for result in hyodo_search::search("기초연금", &config).await? {
///     println!("{}: {}", result.title, result.link);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search(query: &str, config: &SearchConfig) -> Result<Vec<SearchResult>> {
    config.validate()?;
    let full_query = format!("{}{}", query.trim(), config.query_suffix);
    let key = cache::CacheKey::new(&full_query, config);
    if let Some(hit) = cache::get(&key, config.cache_ttl_seconds).await {
        tracing::trace!(count = hit.len(), "search cache hit");
        return Ok(hit);
    }
    tracing::trace!(query = %full_query, "search request");
    let results = naver::fetch(&full_query, config).await?;
    cache::insert(key, results.clone(), config.cache_ttl_seconds).await;
    Ok(results)
}

/// Like [`search`], but any failure yields an empty list.
pub async fn search_or_empty(query: &str, config: &SearchConfig) -> Vec<SearchResult> {
    match search(query, config).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("web search failed, continuing without results: {e}");
            Vec::new()
        }
    }
}
