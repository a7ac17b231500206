//! In-memory cache for search results.
//!
//! Keyed by the normalised query together with the endpoint and result
//! count, so differently configured clients never share entries. Uses
//! [`moka`] for async-friendly caching with TTL and automatic eviction.

use std::sync::OnceLock;
use std::time::Duration;

use moka::future::Cache;

use crate::config::SearchConfig;
use crate::types::SearchResult;

/// Maximum number of cached result sets.
const MAX_CACHE_ENTRIES: u64 = 256;

/// Process-wide search cache.
///
/// TTL is fixed by the first caller.
static CACHE: OnceLock<Cache<CacheKey, Vec<SearchResult>>> = OnceLock::new();

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    base_url: String,
    display: usize,
}

impl CacheKey {
    /// Build a cache key; the query is trimmed and lowercased.
    pub fn new(query: &str, config: &SearchConfig) -> Self {
        Self {
            query: query.trim().to_lowercase(),
            base_url: config.base_url.clone(),
            display: config.display,
        }
    }
}

fn get_or_init_cache(ttl_seconds: u64) -> &'static Cache<CacheKey, Vec<SearchResult>> {
    CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(MAX_CACHE_ENTRIES)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build()
    })
}

/// Look up cached results. Returns `None` on a miss or when caching is off.
pub async fn get(key: &CacheKey, ttl_seconds: u64) -> Option<Vec<SearchResult>> {
    if ttl_seconds == 0 {
        return None;
    }
    get_or_init_cache(ttl_seconds).get(key).await
}

/// Insert results into the cache. No-op when caching is off.
pub async fn insert(key: CacheKey, results: Vec<SearchResult>, ttl_seconds: u64) {
    if ttl_seconds == 0 {
        return;
    }
    get_or_init_cache(ttl_seconds).insert(key, results).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SearchResult> {
        vec![SearchResult {
            title: "기초연금".into(),
            description: "만 65세 이상".into(),
            link: "https://example.kr/pension".into(),
        }]
    }

    #[test]
    fn key_normalises_query() {
        let config = SearchConfig::default();
        assert_eq!(
            CacheKey::new("  기초연금 ", &config),
            CacheKey::new("기초연금", &config)
        );
    }

    #[test]
    fn key_depends_on_endpoint() {
        let a = SearchConfig::default();
        let b = SearchConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        assert_ne!(CacheKey::new("q", &a), CacheKey::new("q", &b));
    }

    #[tokio::test]
    async fn insert_then_get() {
        let config = SearchConfig {
            base_url: "http://cache-test.invalid".into(),
            ..Default::default()
        };
        let key = CacheKey::new("insert_then_get", &config);
        insert(key.clone(), sample(), 60).await;
        assert_eq!(get(&key, 60).await, Some(sample()));
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let config = SearchConfig::default();
        let key = CacheKey::new("zero_ttl_disables_cache", &config);
        insert(key.clone(), sample(), 0).await;
        assert!(get(&key, 0).await.is_none());
    }
}
