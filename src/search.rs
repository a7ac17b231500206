//! Web search collaborator used to ground factual answers.

use async_trait::async_trait;
use hyodo_search::{SearchConfig, SearchResult};

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Results for `query`; empty on error or when nothing matches.
    async fn search(&self, query: &str) -> Vec<SearchResult>;
}

/// Whether `utterance` asks for information worth looking up.
pub fn needs_search(utterance: &str, keywords: &[String]) -> bool {
    !utterance.trim().is_empty() && keywords.iter().any(|k| !k.is_empty() && utterance.contains(k.as_str()))
}

/// Naver web search through `hyodo-search`.
#[derive(Debug, Clone)]
pub struct NaverSearch {
    config: SearchConfig,
}

impl NaverSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SearchProvider for NaverSearch {
    async fn search(&self, query: &str) -> Vec<SearchResult> {
        hyodo_search::search_or_empty(query, &self.config).await
    }
}
