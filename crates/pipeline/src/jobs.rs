//! Jobs and the [`JobStore`] port.
//!
//! A [`Job`] is the unit of work submitted by a caller: one research query,
//! its decomposition, and eventually its answer. The store is the only place
//! job state lives; the orchestrator and the progress writer are handed a
//! store explicitly rather than reaching for ambient state.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending → InProgress → Completed
//!                      ↘ Failed
//! ```
//!
//! Both `Completed` and `Failed` are terminal. A store must refuse any
//! transition out of a terminal state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{FinalAnswer, JobId, Progress, ResearchError, SubQuestion, Timestamp};

/// Lifecycle status of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet started.
    Pending,
    /// The orchestrator is running the job.
    InProgress,
    /// Terminal: the final answer is stored.
    Completed,
    /// Terminal: the job failed; `error` holds the detail.
    Failed,
}

impl JobStatus {
    /// Returns `true` for [`JobStatus::Completed`] and [`JobStatus::Failed`].
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A research job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identity.
    pub id: JobId,
    /// The original research query.
    pub query: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Decomposed sub-questions in decomposition order. Empty until the query
    /// has been decomposed; answered once the job completes.
    pub sub_questions: Vec<SubQuestion>,
    /// Final answer. Only ever set together with [`JobStatus::Completed`].
    pub answer: Option<FinalAnswer>,
    /// Latest progress report.
    pub progress: Progress,
    /// Failure detail. Only ever set together with [`JobStatus::Failed`].
    pub error: Option<String>,
    /// When the job was submitted.
    pub created_at: Timestamp,
    /// When the job record last changed.
    pub updated_at: Timestamp,
}

impl Job {
    /// Creates a pending job for `query`.
    pub fn new(id: JobId, query: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            query: query.into(),
            status: JobStatus::Pending,
            sub_questions: Vec::new(),
            answer: None,
            progress: Progress::pending(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Keyed storage for jobs, injected into the orchestrator and progress writer.
///
/// Implementations must be safe to share across tasks. Every mutating method
/// targets a single job; none of them may move a terminal job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a newly submitted job.
    async fn insert(&self, job: Job) -> Result<(), ResearchError>;

    /// Returns a snapshot of a job, if it exists.
    async fn get(&self, id: JobId) -> Option<Job>;

    /// Returns snapshots of every stored job, oldest first.
    async fn list(&self) -> Vec<Job>;

    /// Marks a pending job as running.
    async fn mark_in_progress(&self, id: JobId) -> Result<(), ResearchError>;

    /// Records the decomposed sub-questions of a running job.
    async fn set_sub_questions(
        &self,
        id: JobId,
        sub_questions: Vec<SubQuestion>,
    ) -> Result<(), ResearchError>;

    /// Merges a progress report into the job (see [`Progress::merge`]).
    ///
    /// Reports for terminal or unknown jobs are ignored.
    async fn update_progress(&self, id: JobId, progress: Progress);

    /// Terminal transition to [`JobStatus::Completed`]. The stored progress
    /// moves to [`crate::Stage::Completed`] in the same step.
    async fn complete(
        &self,
        id: JobId,
        sub_questions: Vec<SubQuestion>,
        answer: FinalAnswer,
    ) -> Result<(), ResearchError>;

    /// Terminal transition to [`JobStatus::Failed`]. The stored progress
    /// moves to [`crate::Stage::Failed`] in the same step.
    async fn fail(&self, id: JobId, error: String) -> Result<(), ResearchError>;
}
