//! Evidence-source ports: web search, document discovery, and document
//! conversion.
//!
//! ## Architectural Layer
//!
//! **Port definitions.** Concrete providers live in the `providers` crate;
//! the orchestration layer sees only these traits and the [`Credential`]
//! values it leases from a rotation pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DocumentUrl, Keyword, TransportError};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// An API credential for a rate-limited provider.
///
/// The secret is never printed: `Debug` and `Display` render a redacted form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a secret, returning `None` if it is blank.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let s = secret.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the secret for use in an outgoing request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({self})")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if self.0.chars().count() > 8 {
            write!(f, "***{tail}")
        } else {
            f.write_str("***")
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Keyword web search returning raw result text.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Searches for `keyword` using `credential`.
    async fn search(&self, keyword: &Keyword, credential: &Credential)
        -> Result<String, TransportError>;
}

// ---------------------------------------------------------------------------
// Document discovery
// ---------------------------------------------------------------------------

/// Cost bounds for one document-discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryLimits {
    /// Stop once this many document URLs have been collected.
    pub max_results: usize,
    /// Stop once this many results have been inspected or requests have
    /// failed, whichever happens first.
    pub max_attempts: usize,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_results: 30,
            max_attempts: 10,
        }
    }
}

/// Finds downloadable documents relevant to a set of keywords.
#[async_trait]
pub trait DocumentFinder: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Returns candidate document URLs, bounded by `limits`.
    ///
    /// Individual failed requests count against `limits.max_attempts`;
    /// an error is returned only when discovery could not run at all.
    async fn find_documents(
        &self,
        keywords: &[Keyword],
        limits: DiscoveryLimits,
    ) -> Result<Vec<DocumentUrl>, TransportError>;
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// One way of turning a document URL into plain text.
///
/// Strategies are composed in priority order by the conversion pipeline.
#[async_trait]
pub trait ConversionStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &str;

    /// Converts the document at `url` to text.
    async fn convert(&self, url: &DocumentUrl) -> Result<String, TransportError>;
}
