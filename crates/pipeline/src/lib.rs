//! Core research domain for Quarry.
//!
//! This crate contains every domain concept, newtype identifier, research
//! artefact, progress vocabulary, error type, and port trait used throughout
//! the engine. Infrastructure crates implement the traits defined here; they
//! never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`JobId`, `Keyword`, `CredentialSlot`, etc.) |
//! | [`types`] | Research artefacts (`SubQuestion`, `RefinedAnalysis`, `FinalAnswer`, etc.) |
//! | [`references`] | Reference deduplication and citation renumbering |
//! | [`progress`] | Stage vocabulary, `Progress`, and the `ProgressSink` port |
//! | [`jobs`] | `Job` lifecycle and the `JobStore` port |
//! | [`generation`] | The `Generator` port |
//! | [`evidence`] | Search, discovery, and conversion ports; `Credential` |
//! | [`settings`] | `ResearchSettings` thresholds and budgets |
//! | [`errors`] | Error taxonomy and retry policy |

pub mod errors;
pub mod evidence;
pub mod generation;
pub mod identifiers;
pub mod jobs;
pub mod progress;
pub mod references;
pub mod settings;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{
    parse_retry_after, AlreadyAnswered, GenerateError, ParseError, QualityError, ResearchError,
    RetryPolicy, Retryable, TransportError,
};
pub use evidence::{ConversionStrategy, Credential, DiscoveryLimits, DocumentFinder, SearchProvider};
pub use generation::{GenerationRequest, Generator, ModelTier};
pub use identifiers::{CredentialSlot, DocumentUrl, JobId, Keyword, SubQuestionIndex};
pub use jobs::{Job, JobStatus, JobStore};
pub use progress::{Progress, ProgressSink, ProgressUpdate, Stage};
pub use references::{cited_numbers, consolidate_citations, ReferenceList};
pub use settings::ResearchSettings;
pub use types::{
    AnalyzedPoint, CompleteAnalysis, DocumentAnalysis, DocumentSummary, FinalAnswer,
    RefinedAnalysis, SubQuestion, SubQuestionAnswer, SubQuestionOutcome, Timestamp,
    NO_DOCUMENTS_FOUND,
};
