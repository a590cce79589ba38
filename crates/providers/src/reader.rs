//! Remote reader-service conversion (`GET {endpoint}/{document url}`).

use async_trait::async_trait;
use pipeline::{ConversionStrategy, Credential, DocumentUrl, TransportError};
use reqwest::Client;

use crate::http::{request_error, retry_after, status_error};

/// Production Jina reader endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://r.jina.ai";

const PROVIDER: &str = "reader-service";

/// [`ConversionStrategy`] that asks a reader service to render a document as
/// plain text.
///
/// The document URL is appended verbatim to the service root. The response
/// body is returned as-is; judging whether it is long enough is left to the
/// conversion pipeline's gate.
#[derive(Debug, Clone)]
pub struct ReaderServiceStrategy {
    client: Client,
    endpoint: String,
    api_key: Option<Credential>,
}

impl ReaderServiceStrategy {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<Credential>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ConversionStrategy for ReaderServiceStrategy {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn convert(&self, url: &DocumentUrl) -> Result<String, TransportError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.endpoint, url.as_str()))
            .header("accept", "text/plain");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request.send().await.map_err(|e| request_error(PROVIDER, &e))?;
        let status = response.status();
        let after = retry_after(response.headers());
        let body = response.text().await.map_err(|e| request_error(PROVIDER, &e))?;
        if !status.is_success() {
            return Err(status_error(PROVIDER, status, after, &body));
        }

        tracing::debug!(url = %url, chars = body.len(), "reader service converted document");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipeline::{RetryPolicy, Retryable};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::build_client;

    fn document() -> DocumentUrl {
        DocumentUrl::new("https://docs.example/annual-report.pdf").expect("non-empty")
    }

    fn client() -> Client {
        build_client(Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn document_url_is_appended_to_the_service_root() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/https://docs.example/annual-report.pdf"))
            .and(header("authorization", "Bearer jina-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Annual report text"))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = ReaderServiceStrategy::new(
            client(),
            format!("{}/", server.uri()),
            Credential::new("jina-test-key"),
        );
        let text = strategy.convert(&document()).await.expect("converted");
        assert_eq!(text, "Annual report text");
    }

    #[tokio::test]
    async fn anonymous_requests_carry_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("text"))
            .mount(&server)
            .await;

        let strategy = ReaderServiceStrategy::new(client(), server.uri(), None);
        strategy.convert(&document()).await.expect("converted");

        let received = server.received_requests().await.expect("recording enabled");
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn missing_document_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let strategy = ReaderServiceStrategy::new(client(), server.uri(), None);
        let err = strategy.convert(&document()).await.expect_err("404");
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(err.provider, "reader-service");
    }
}
