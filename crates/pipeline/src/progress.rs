//! Progress vocabulary and the [`ProgressSink`] port.
//!
//! Progress is a small record, `{total_steps, current_step, stage, detail}`,
//! overwritten as a job advances. `current_step` never decreases within a job,
//! and a job's final progress record always carries either
//! [`Stage::Completed`] or [`Stage::Failed`].
//!
//! ## Architectural Layer
//!
//! **Port definition.** The orchestration layer reports through
//! [`ProgressSink`]; where updates end up (an in-memory store, a database, a
//! log) is an infrastructure decision.

use serde::{Deserialize, Serialize};

use crate::{JobId, SubQuestionIndex};

// ---------------------------------------------------------------------------
// Stage vocabulary
// ---------------------------------------------------------------------------

/// The fixed, ordered vocabulary of pipeline stages.
///
/// Job-level stages bracket sub-question stages:
///
/// ```text
/// Started → DecomposingQuery → ProcessingSubQuestions → SynthesizingFinal → Completed | Failed
///                                      │
///                  (per sub-question)  ▼
///   KeywordsGenerating → EvidenceGathering → Refining → Synthesizing → SubQuestionCompleted
/// ```
///
/// The derived ordering follows declaration order and is used only for
/// display; reports from concurrent sub-questions interleave freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Job accepted and its tracker created.
    Started,
    /// Breaking the query into sub-questions.
    DecomposingQuery,
    /// All sub-question pipelines launched.
    ProcessingSubQuestions,
    /// Generating search keywords for one sub-question.
    KeywordsGenerating,
    /// Keyword and document branches running for one sub-question.
    EvidenceGathering,
    /// Condensing collected evidence for one sub-question.
    Refining,
    /// Writing the cited answer for one sub-question.
    Synthesizing,
    /// One sub-question pipeline finished.
    SubQuestionCompleted,
    /// Combining every sub-question into the final answer.
    SynthesizingFinal,
    /// Terminal: the answer is stored.
    Completed,
    /// Terminal: the job failed; no answer is stored.
    Failed,
}

impl Stage {
    /// Returns the snake-case name used on the wire and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Started => "started",
            Stage::DecomposingQuery => "decomposing_query",
            Stage::ProcessingSubQuestions => "processing_sub_questions",
            Stage::KeywordsGenerating => "keywords_generating",
            Stage::EvidenceGathering => "evidence_gathering",
            Stage::Refining => "refining",
            Stage::Synthesizing => "synthesizing",
            Stage::SubQuestionCompleted => "sub_question_completed",
            Stage::SynthesizingFinal => "synthesizing_final",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    /// Returns `true` for [`Stage::Completed`] and [`Stage::Failed`].
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Progress record
// ---------------------------------------------------------------------------

/// Snapshot of how far a job has advanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Current estimate of the total number of steps.
    ///
    /// Grows once the number of sub-questions is known; never smaller than
    /// `current_step`.
    pub total_steps: u64,
    /// Number of steps reported so far. Monotonically non-decreasing.
    pub current_step: u64,
    /// Most recently entered stage.
    pub stage: Stage,
    /// Free-text description of the latest step.
    pub detail: String,
}

impl Progress {
    /// Progress of a job that has been accepted but not yet started.
    pub fn pending() -> Self {
        Self {
            total_steps: 0,
            current_step: 0,
            stage: Stage::Started,
            detail: "queued".to_string(),
        }
    }

    /// Merges a newer report into this record, last-write-wins per field,
    /// except that `current_step` and `total_steps` never move backwards and a
    /// terminal stage is never replaced.
    ///
    /// Returns `true` if anything changed.
    pub fn merge(&mut self, newer: &Progress) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        if newer.current_step < self.current_step && !newer.stage.is_terminal() {
            return false;
        }

        let before = self.clone();
        self.current_step = self.current_step.max(newer.current_step);
        self.total_steps = self
            .total_steps
            .max(newer.total_steps)
            .max(self.current_step);
        self.stage = newer.stage;
        self.detail.clone_from(&newer.detail);
        *self != before
    }
}

/// A progress report addressed to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Job the report belongs to.
    pub job_id: JobId,
    /// Sub-question the report concerns, if any.
    pub sub_question: Option<SubQuestionIndex>,
    /// The progress record itself.
    pub progress: Progress,
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Destination for progress reports.
///
/// `report` is fire-and-forget: implementations must return promptly and must
/// not block the pipeline on persistence latency (queue the update and persist
/// it elsewhere). Reports from concurrent branches arrive in no defined order.
pub trait ProgressSink: Send + Sync {
    /// Records one progress update.
    fn report(&self, update: ProgressUpdate);
}
