//! Error taxonomy and retry-policy types for the research pipeline.
//!
//! The taxonomy has four tiers, and only the last one ever reaches a job:
//!
//! | Error | Produced by | Disposition |
//! |-------|-------------|-------------|
//! | [`TransportError`] | network / provider failure | retried with credential rotation, bounded |
//! | [`ParseError`] | generation output fails its schema | one reformat call, else empty default |
//! | [`QualityError`] | artefact valid but below a threshold | artefact dropped, never retried |
//! | [`ResearchError::Fatal`] | decomposition or final synthesis | job marked `Failed` |
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions implements [`Retryable`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{JobId, Stage};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the retry executor decide
/// whether to re-invoke an operation or give up on the artefact.
///
/// - `Retryable` errors: timeouts, connection resets, rate-limit responses,
///   server errors.
/// - `NonRetryable` errors: malformed requests, rejected credentials for the
///   whole provider, invalid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means retry
        /// immediately.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

/// Errors that can tell the retry executor how to treat them.
pub trait Retryable {
    /// Returns the retry policy for this error instance.
    fn retry_policy(&self) -> RetryPolicy;
}

// ---------------------------------------------------------------------------
// Per-artefact errors
// ---------------------------------------------------------------------------

/// A network or provider failure talking to an external collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{provider} transport error: {message}")]
pub struct TransportError {
    /// Name of the provider that failed (e.g. `"tavily"`, `"openai"`).
    pub provider: String,
    /// Human-readable description of the failure.
    pub message: String,
    /// Whether the failing call may be repeated.
    pub retry: RetryPolicy,
}

impl TransportError {
    /// Creates a retryable transport error with no minimum back-off.
    pub fn retryable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retry: RetryPolicy::Retryable { after: None },
        }
    }

    /// Creates a transport error that must not be retried.
    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retry: RetryPolicy::NonRetryable,
        }
    }

    /// Records the back-off the provider asked for before the next attempt.
    #[must_use]
    pub fn retry_after(mut self, after: Duration) -> Self {
        self.retry = RetryPolicy::Retryable { after: Some(after) };
        self
    }

    /// Maps a non-success HTTP status onto a transport error.
    ///
    /// 408, 429 and every 5xx status are retryable, as is any status listed in
    /// `quota_codes` (provider-specific "plan exhausted" codes). Every other
    /// status is fatal. `retry_after` is kept only on retryable errors, and
    /// the message carries a bounded excerpt of `body`.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        quota_codes: &[u16],
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        let excerpt: String = body.chars().take(MAX_STATUS_BODY).collect();
        let message = format!("HTTP {status}: {}", excerpt.trim());
        let retryable =
            matches!(status, 408 | 429) || (500..600).contains(&status) || quota_codes.contains(&status);

        match (retryable, retry_after) {
            (true, Some(after)) => Self::retryable(provider, message).retry_after(after),
            (true, None) => Self::retryable(provider, message),
            (false, _) => Self::fatal(provider, message),
        }
    }
}

/// Longest response body excerpt carried in an HTTP status error.
const MAX_STATUS_BODY: usize = 300;

/// Parses a `Retry-After` header value given in whole seconds.
///
/// The HTTP-date form is not supported and yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

impl Retryable for TransportError {
    fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }
}

/// Generation output that could not be parsed against its expected schema.
///
/// The unparsed output is retained so the reformat recovery task can attempt
/// to restructure it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("output of task '{task}' does not match its schema: {message}")]
pub struct ParseError {
    /// Name of the structured task whose output failed to parse.
    pub task: String,
    /// Parser diagnostic.
    pub message: String,
    /// The raw model output.
    pub raw: String,
}

/// Failure of a [`crate::Generator`] call.
///
/// Transport and parse failures are kept distinct: the former is retried, the
/// latter is handed to reformat recovery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError {
    /// The model could not be reached or rejected the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The model answered, but not in the requested shape.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl Retryable for GenerateError {
    fn retry_policy(&self) -> RetryPolicy {
        match self {
            GenerateError::Transport(e) => e.retry_policy(),
            GenerateError::Parse(_) => RetryPolicy::Retryable { after: None },
        }
    }
}

/// An artefact that is technically valid but not good enough to keep.
///
/// Quality errors are never retried: the problem is the upstream content, not
/// a transient failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{artifact} rejected: {reason}")]
pub struct QualityError {
    /// What kind of artefact was rejected (e.g. `"document analysis"`).
    pub artifact: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Attempt to set a sub-question's answer a second time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sub-question '{question}' already has an answer")]
pub struct AlreadyAnswered {
    /// Text of the sub-question.
    pub question: String,
}

// ---------------------------------------------------------------------------
// Job-level errors
// ---------------------------------------------------------------------------

/// Errors that escape to the job level.
///
/// Per-artefact errors are converted into empty or placeholder artefacts at
/// the smallest enclosing task; only the variants below are ever surfaced to
/// callers of the orchestrator or the job store.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ResearchError {
    /// An unrecoverable failure in a stage that has no degraded fallback
    /// (query decomposition or final synthesis).
    ///
    /// The job is marked `Failed` with this error's message; no partial
    /// answer is stored.
    #[error("{stage} failed: {message}")]
    Fatal {
        /// Stage during which the failure occurred.
        stage: Stage,
        /// Human-readable cause.
        message: String,
    },

    /// The submitted query is blank.
    #[error("Research query must not be empty")]
    EmptyQuery,

    /// No job with the given identifier exists in the store.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// A job with the given identifier is already stored.
    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    /// The job exists but is already in a terminal state.
    #[error("Job {0} is already terminal")]
    JobTerminal(JobId),

    /// Settings or runtime configuration are invalid.
    ///
    /// Produced at load time; the engine never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}
