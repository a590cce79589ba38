//! Tavily web search.

use async_trait::async_trait;
use pipeline::{Credential, Keyword, SearchProvider, TransportError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::http::{request_error, retry_after, status_error};

/// Production Tavily API root.
pub const DEFAULT_ENDPOINT: &str = "https://api.tavily.com";

const PROVIDER: &str = "tavily";

/// [`SearchProvider`] over the Tavily `/search` endpoint.
///
/// Results are rendered as `Source: <url>` blocks followed by the result
/// content, separated by blank lines. An empty result list yields an empty
/// string, which the orchestrator treats as an unusable result.
#[derive(Debug, Clone)]
pub struct TavilySearch {
    client: Client,
    endpoint: String,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    /// Creates a search adapter for `endpoint` (see [`DEFAULT_ENDPOINT`]).
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_results: 5,
        }
    }

    /// Sets how many results a search asks for.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(&self, keyword: &Keyword, credential: &Credential) -> Result<String, TransportError> {
        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .bearer_auth(credential.expose())
            .json(&json!({
                "query": keyword.as_str(),
                "search_depth": "advanced",
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &e))?;

        let status = response.status();
        let after = retry_after(response.headers());
        let body = response.text().await.map_err(|e| request_error(PROVIDER, &e))?;
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, after, &body));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::fatal(PROVIDER, format!("unexpected response: {e}")))?;
        tracing::debug!(keyword = %keyword, hits = parsed.results.len(), "search completed");

        Ok(parsed
            .results
            .iter()
            .filter(|hit| !hit.content.trim().is_empty())
            .map(|hit| format!("Source: {}\n{}", hit.url, hit.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
