//! Core types for search results.

use serde::{Deserialize, Serialize};

/// A single web document returned by the search API, already sanitised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document title with markup removed.
    pub title: String,
    /// Short description of the page with markup removed.
    pub description: String,
    /// Link to the page.
    pub link: String,
}

/// Raw response envelope of the `webkr` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct WebSearchResponse {
    #[serde(default)]
    pub items: Vec<WebSearchItem>,
}

/// Raw item as delivered by the API (may contain `<b>` highlighting).
#[derive(Debug, Deserialize)]
pub(crate) struct WebSearchItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
}
