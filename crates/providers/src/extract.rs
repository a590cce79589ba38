//! Direct download followed by local PDF text extraction.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{ConversionStrategy, DocumentUrl, TransportError};
use reqwest::Client;
use tracing::debug;

use crate::http::{request_error, retry_after, status_error};

const PROVIDER: &str = "download-extract";

/// [`ConversionStrategy`] that downloads the document and extracts its text
/// with `pdf-extract`.
///
/// The downloaded bytes are written to a named temporary file inside the
/// scratch directory for the duration of the extraction. The file is removed
/// when the extraction finishes, fails or panics.
#[derive(Debug, Clone)]
pub struct DownloadExtractStrategy {
    client: Client,
    scratch_dir: PathBuf,
}

impl DownloadExtractStrategy {
    /// Creates a strategy that writes temporary files to the OS temp directory.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Writes temporary files to `dir` instead.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    async fn download(&self, url: &DocumentUrl) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, after, &body));
        }
        let bytes = response.bytes().await.map_err(|e| request_error(PROVIDER, &e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ConversionStrategy for DownloadExtractStrategy {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn convert(&self, url: &DocumentUrl) -> Result<String, TransportError> {
        let bytes = self.download(url).await?;
        debug!(url = %url, bytes = bytes.len(), "document downloaded");

        let dir = self.scratch_dir.clone();
        tokio::task::spawn_blocking(move || extract_text(&dir, &bytes))
            .await
            .map_err(|e| TransportError::fatal(PROVIDER, format!("extraction aborted: {e}")))?
    }
}

fn extract_text(dir: &Path, bytes: &[u8]) -> Result<String, TransportError> {
    let mut file = tempfile::Builder::new()
        .prefix("quarry-")
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(|e| TransportError::fatal(PROVIDER, format!("cannot create scratch file: {e}")))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| TransportError::fatal(PROVIDER, format!("cannot write scratch file: {e}")))?;

    pdf_extract::extract_text(file.path())
        .map_err(|e| TransportError::fatal(PROVIDER, format!("PDF extraction failed: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipeline::{RetryPolicy, Retryable};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::build_client;

    fn strategy(dir: &Path) -> DownloadExtractStrategy {
        DownloadExtractStrategy::new(build_client(Duration::from_secs(5)).expect("client"))
            .with_scratch_dir(dir)
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).expect("readable").count()
    }

    #[tokio::test]
    async fn invalid_pdf_fails_and_leaves_no_scratch_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"this is not a pdf".to_vec()))
            .mount(&server)
            .await;
        let scratch = tempfile::tempdir().expect("tempdir");
        let url = DocumentUrl::new(format!("{}/broken.pdf", server.uri())).expect("non-empty");

        let err = strategy(scratch.path()).convert(&url).await.expect_err("not a PDF");

        assert_eq!(err.provider, "download-extract");
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(entries(scratch.path()), 0);
    }

    #[tokio::test]
    async fn failed_download_never_touches_the_scratch_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let scratch = tempfile::tempdir().expect("tempdir");
        let url = DocumentUrl::new(format!("{}/missing.pdf", server.uri())).expect("non-empty");

        let err = strategy(scratch.path()).convert(&url).await.expect_err("404");

        assert!(err.message.starts_with("HTTP 404"));
        assert_eq!(entries(scratch.path()), 0);
    }
}
