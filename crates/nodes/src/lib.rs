//! Quarry research orchestration.
//!
//! This crate sequences one research job from query to cited answer: query
//! decomposition, a concurrent pipeline per sub-question (keyword search and
//! document analysis branches), and final synthesis. Around that sit the
//! policies that keep a job alive when its collaborators misbehave: credential
//! rotation, bounded retry, quality gates, conversion fallback, and reformat
//! recovery for malformed generation output.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between the domain types in
//! the [`pipeline`] crate and the port traits it defines (generation, search,
//! discovery, conversion, job storage, progress). They hold no provider
//! details of their own.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`orchestrator`] | `ResearchOrchestrator`: job lifecycle and sub-question fan-out |
//! | [`sub_question`] | `SubQuestionPipeline`: evidence → cited answer |
//! | [`evidence`] | `EvidenceCollector`: keyword and document branches |
//! | [`conversion`] | `ConversionPipeline`: ordered strategies with fallback |
//! | [`structured`] | `StructuredGenerator`: retry and reformat recovery |
//! | [`tasks`] | Structured task prompts and output schemas |
//! | [`quality`] | `QualityGate` and `MinLength` |
//! | [`retry`] | `RetryExecutor` |
//! | [`credentials`] | `CredentialPool` |
//! | [`progress`] | `ProgressTracker` and `ChannelProgressSink` |
//! | [`store`] | `InMemoryJobStore` |
//! | [`services`] | `ResearchServices`: the ports a job runs against |

pub mod conversion;
pub mod credentials;
pub mod evidence;
pub mod orchestrator;
pub mod progress;
pub mod quality;
pub mod retry;
pub mod services;
pub mod store;
pub mod structured;
pub mod sub_question;
pub mod tasks;

pub use conversion::ConversionPipeline;
pub use credentials::{CredentialLease, CredentialPool};
pub use evidence::{Evidence, EvidenceCollector};
pub use orchestrator::ResearchOrchestrator;
pub use progress::{ChannelProgressSink, ProgressTracker, SubQuestionProgress};
pub use quality::{MinLength, QualityGate};
pub use retry::{AttemptFailure, RetryExecutor, RetryOutcome};
pub use services::ResearchServices;
pub use store::InMemoryJobStore;
pub use structured::StructuredGenerator;
pub use sub_question::SubQuestionPipeline;
