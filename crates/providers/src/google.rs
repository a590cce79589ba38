//! PDF discovery through the Google Custom Search JSON API.

use async_trait::async_trait;
use pipeline::{Credential, DiscoveryLimits, DocumentFinder, DocumentUrl, Keyword, TransportError};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::http::{request_error, status_error};

/// Production Custom Search endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

const PROVIDER: &str = "google-cse";

/// [`DocumentFinder`] that keeps search results whose link ends in `.pdf`.
///
/// Keywords are searched one after another. Every result inspected, PDF or
/// not, and every failed request counts as one attempt against
/// [`DiscoveryLimits::max_attempts`]; discovery stops as soon as either limit
/// is reached.
#[derive(Debug, Clone)]
pub struct GoogleDocumentFinder {
    client: Client,
    endpoint: String,
    api_key: Credential,
    engine_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

impl GoogleDocumentFinder {
    /// Creates a finder for the search engine `engine_id`.
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        api_key: Credential,
        engine_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            engine_id: engine_id.into(),
        }
    }

    async fn search(&self, keyword: &Keyword) -> Result<Vec<SearchItem>, TransportError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.expose()),
                ("cx", self.engine_id.as_str()),
                ("q", keyword.as_str()),
            ])
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| request_error(PROVIDER, &e))?;
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, None, &body));
        }
        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::fatal(PROVIDER, format!("unexpected response: {e}")))?;
        Ok(parsed.items)
    }
}

#[async_trait]
impl DocumentFinder for GoogleDocumentFinder {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn find_documents(
        &self,
        keywords: &[Keyword],
        limits: DiscoveryLimits,
    ) -> Result<Vec<DocumentUrl>, TransportError> {
        let mut links = Vec::new();
        let mut attempts = 0;
        let exhausted = |links: &Vec<DocumentUrl>, attempts: usize| {
            attempts >= limits.max_attempts || links.len() >= limits.max_results
        };

        for keyword in keywords {
            if exhausted(&links, attempts) {
                break;
            }
            match self.search(keyword).await {
                Ok(items) => {
                    for item in items {
                        if exhausted(&links, attempts) {
                            break;
                        }
                        if item.link.to_lowercase().ends_with(".pdf") {
                            links.extend(DocumentUrl::new(item.link));
                        }
                        attempts += 1;
                    }
                }
                Err(error) => {
                    warn!(keyword = %keyword, %error, "document search failed");
                    attempts += 1;
                }
            }
        }

        debug!(found = links.len(), attempts, "document discovery finished");
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::build_client;

    fn finder(server: &MockServer) -> GoogleDocumentFinder {
        GoogleDocumentFinder::new(
            build_client(Duration::from_secs(5)).expect("client"),
            format!("{}/customsearch/v1", server.uri()),
            Credential::new("google-test-key").expect("non-empty"),
            "engine-1",
        )
    }

    fn keywords(texts: &[&str]) -> Vec<Keyword> {
        texts.iter().filter_map(|t| Keyword::new(*t)).collect()
    }

    fn items(links: &[&str]) -> Value {
        json!({ "items": links.iter().map(|l| json!({ "link": l })).collect::<Vec<_>>() })
    }

    async fn mount(server: &MockServer, q: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(query_param("q", q))
            .and(query_param("cx", "engine-1"))
            .and(query_param("key", "google-test-key"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn keeps_only_pdf_links() {
        let server = MockServer::start().await;
        mount(
            &server,
            "ev report filetype:pdf",
            ResponseTemplate::new(200).set_body_json(items(&[
                "https://a.example/report.PDF",
                "https://b.example/page.html",
                "https://c.example/deck.pdf",
            ])),
        )
        .await;

        let found = finder(&server)
            .find_documents(&keywords(&["ev report filetype:pdf"]), DiscoveryLimits::default())
            .await
            .expect("discovery runs");
        let found: Vec<&str> = found.iter().map(DocumentUrl::as_str).collect();
        assert_eq!(found, vec!["https://a.example/report.PDF", "https://c.example/deck.pdf"]);
    }

    #[tokio::test]
    async fn every_inspected_result_and_failure_counts_as_an_attempt() {
        let server = MockServer::start().await;
        mount(&server, "broken", ResponseTemplate::new(500)).await;
        mount(
            &server,
            "first",
            ResponseTemplate::new(200).set_body_json(items(&[
                "https://x.example/1.html",
                "https://x.example/2.pdf",
                "https://x.example/3.pdf",
            ])),
        )
        .await;
        mount(
            &server,
            "second",
            ResponseTemplate::new(200).set_body_json(items(&["https://y.example/4.pdf"])),
        )
        .await;

        let limits = DiscoveryLimits {
            max_results: 30,
            max_attempts: 3,
        };
        let found = finder(&server)
            .find_documents(&keywords(&["broken", "first", "second"]), limits)
            .await
            .expect("discovery runs");

        // 1 failure + 2 inspected results exhaust the budget of 3.
        let found: Vec<&str> = found.iter().map(DocumentUrl::as_str).collect();
        assert_eq!(found, vec!["https://x.example/2.pdf"]);
    }

    #[tokio::test]
    async fn stops_at_max_results() {
        let server = MockServer::start().await;
        mount(
            &server,
            "many",
            ResponseTemplate::new(200).set_body_json(items(&[
                "https://z.example/1.pdf",
                "https://z.example/2.pdf",
                "https://z.example/3.pdf",
            ])),
        )
        .await;

        let limits = DiscoveryLimits {
            max_results: 2,
            max_attempts: 10,
        };
        let found = finder(&server)
            .find_documents(&keywords(&["many", "many again"]), limits)
            .await
            .expect("discovery runs");
        assert_eq!(found.len(), 2);
    }
}
