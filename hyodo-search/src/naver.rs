//! Naver `webkr` web document search.
//!
//! The endpoint wraps matched terms in `<b>` tags and escapes quotes as
//! HTML entities; both are removed before results leave this module.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::http::build_client;
use crate::types::{SearchResult, WebSearchResponse};

/// Path of the web document search endpoint.
const WEB_SEARCH_PATH: &str = "/v1/search/webkr.json";

/// Query the API once and return sanitised results.
///
/// `query` is sent as-is; callers append [`SearchConfig::query_suffix`].
pub(crate) async fn fetch(query: &str, config: &SearchConfig) -> Result<Vec<SearchResult>, SearchError> {
    let client = build_client(config)?;
    let url = format!("{}{}", config.base_url.trim_end_matches('/'), WEB_SEARCH_PATH);
    let display = config.display.to_string();

    let response = client
        .get(&url)
        .query(&[
            ("query", query),
            ("display", display.as_str()),
            ("sort", config.sort.as_str()),
        ])
        .header("X-Naver-Client-Id", &config.client_id)
        .header("X-Naver-Client-Secret", &config.client_secret)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(e.to_string())
            } else {
                SearchError::Http(e.to_string())
            }
        })?;

    let status = response.status();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(SearchError::Credentials(format!("status {status}")));
    }
    if !status.is_success() {
        return Err(SearchError::Http(format!("status {status}")));
    }

    let body: WebSearchResponse = response
        .json()
        .await
        .map_err(|e| SearchError::Parse(e.to_string()))?;

    Ok(body
        .items
        .into_iter()
        .map(|item| SearchResult {
            title: clean_markup(&item.title),
            description: clean_markup(&item.description),
            link: item.link,
        })
        .collect())
}

/// Remove HTML tags and decode the handful of entities the API emits.
pub fn clean_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_owned()
}
