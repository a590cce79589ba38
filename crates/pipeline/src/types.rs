//! Research data model.
//!
//! These are the artefacts that flow down the pipeline for a single job:
//!
//! ```text
//! SubQuestion ─┬─ keyword branch:  AnalyzedPoint* → CompleteAnalysis → RefinedAnalysis
//!              └─ document branch: DocumentAnalysis* → DocumentSummary
//!                                                   ↓
//!                        SubQuestionAnswer (written once into the SubQuestion)
//! ```
//!
//! Artefacts are plain owned values. Each one belongs to the task that
//! produced it until it is moved to the parent at a join point; nothing here
//! is shared between concurrent branches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AlreadyAnswered, DocumentUrl, SubQuestionIndex};

/// Summary text used when the document branch accepted no documents.
pub const NO_DOCUMENTS_FOUND: &str = "No documents found.";

// ---------------------------------------------------------------------------
// Sub-questions
// ---------------------------------------------------------------------------

/// One decomposed facet of the main research query.
///
/// `answer` and `references` are write-once: they are set by the owning
/// sub-question pipeline through [`SubQuestion::record_answer`] and refused
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    /// The question text.
    pub question: String,
    answer: Option<String>,
    references: Vec<String>,
}

impl SubQuestion {
    /// Creates an unanswered sub-question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
            references: Vec::new(),
        }
    }

    /// The answer, once recorded.
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    /// References cited by the answer, in citation order.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Returns `true` once an answer has been recorded.
    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }

    /// Writes the answer and its references.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyAnswered`] if an answer was recorded before; the
    /// existing answer is left untouched.
    pub fn record_answer(&mut self, answer: SubQuestionAnswer) -> Result<(), AlreadyAnswered> {
        if self.answer.is_some() {
            return Err(AlreadyAnswered {
                question: self.question.clone(),
            });
        }
        self.answer = Some(answer.answer);
        self.references = answer.references;
        Ok(())
    }
}

/// The cited answer produced for a single sub-question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestionAnswer {
    /// Answer prose with inline `[^n^]` citation markers.
    pub answer: String,
    /// References in marker order.
    pub references: Vec<String>,
}

// ---------------------------------------------------------------------------
// Keyword branch artefacts
// ---------------------------------------------------------------------------

/// A condensed fact extracted from one search result, with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedPoint {
    /// The condensed fact.
    pub point: String,
    /// Where the fact came from (usually a URL).
    pub reference: String,
}

/// Every [`AnalyzedPoint`] gathered for one sub-question.
///
/// Order is the completion order of the contributing keyword tasks and is not
/// significant. Duplicates are permitted; refinement removes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteAnalysis {
    points: Vec<AnalyzedPoint>,
}

impl CompleteAnalysis {
    /// Creates an empty analysis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the points produced by one keyword task.
    pub fn absorb(&mut self, batch: impl IntoIterator<Item = AnalyzedPoint>) {
        self.points.extend(batch);
    }

    /// All points gathered so far.
    pub fn points(&self) -> &[AnalyzedPoint] {
        &self.points
    }

    /// Number of points gathered.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if no keyword task produced any point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<AnalyzedPoint> for CompleteAnalysis {
    fn from_iter<I: IntoIterator<Item = AnalyzedPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Condensed prose synthesis of a [`CompleteAnalysis`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedAnalysis {
    /// Prose with inline citation markers.
    pub analysis: String,
    references: Vec<String>,
}

impl RefinedAnalysis {
    /// Creates a refined analysis; duplicate references are removed, keeping
    /// the first occurrence.
    pub fn new(analysis: impl Into<String>, references: impl IntoIterator<Item = String>) -> Self {
        Self {
            analysis: analysis.into(),
            references: dedup_references(references),
        }
    }

    /// Deduplicated references.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Returns `true` if the refinement produced no prose.
    pub fn is_empty(&self) -> bool {
        self.analysis.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Document branch artefacts
// ---------------------------------------------------------------------------

/// Analysis of one downloaded document.
///
/// Only analyses that pass the document quality gate are ever constructed
/// into the summary's input set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Source document.
    pub url: DocumentUrl,
    /// Extracted analysis text.
    pub analysis: String,
}

/// Condensed, referenced summary of every accepted [`DocumentAnalysis`] for
/// one sub-question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Summary prose.
    pub summary: String,
    references: Vec<String>,
}

impl DocumentSummary {
    /// Creates a summary; duplicate references are removed.
    pub fn new(summary: impl Into<String>, references: impl IntoIterator<Item = String>) -> Self {
        Self {
            summary: summary.into(),
            references: dedup_references(references),
        }
    }

    /// Placeholder used when no document survived discovery, conversion and
    /// quality gating.
    pub fn no_documents_found() -> Self {
        Self {
            summary: NO_DOCUMENTS_FOUND.to_string(),
            references: Vec::new(),
        }
    }

    /// Deduplicated references.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Returns `true` if this is the "no documents found" placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.summary == NO_DOCUMENTS_FOUND && self.references.is_empty()
    }
}

impl Default for DocumentSummary {
    fn default() -> Self {
        Self::no_documents_found()
    }
}

// ---------------------------------------------------------------------------
// Join results
// ---------------------------------------------------------------------------

/// Everything a sub-question pipeline hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestionOutcome {
    /// Position of the sub-question in the decomposition.
    pub index: SubQuestionIndex,
    /// The sub-question, answered unless synthesis degraded.
    pub sub_question: SubQuestion,
    /// Keyword-branch evidence.
    pub refined: RefinedAnalysis,
    /// Document-branch evidence.
    pub documents: DocumentSummary,
}

impl SubQuestionOutcome {
    /// Outcome for a sub-question whose pipeline could not run at all.
    pub fn empty(index: SubQuestionIndex, sub_question: SubQuestion) -> Self {
        Self {
            index,
            sub_question,
            refined: RefinedAnalysis::default(),
            documents: DocumentSummary::no_documents_found(),
        }
    }
}

/// The final, cross-sub-question answer to a research query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// Answer prose; `[^n^]` markers index into `references` (1-based).
    pub answer: String,
    /// Consolidated, deduplicated, numbered reference list.
    pub references: Vec<String>,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------

/// Removes blank and repeated references, keeping first-occurrence order.
pub(crate) fn dedup_references(references: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    references
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str, refs: &[&str]) -> SubQuestionAnswer {
        SubQuestionAnswer {
            answer: text.to_string(),
            references: refs.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn sub_question_answer_is_write_once() {
        let mut q = SubQuestion::new("How big is the EV market?");
        q.record_answer(answer("Large [^1^]", &["https://a"]))
            .expect("first write succeeds");

        let err = q
            .record_answer(answer("Overwritten", &["https://b"]))
            .expect_err("second write is refused");
        assert_eq!(err.question, "How big is the EV market?");
        assert_eq!(q.answer(), Some("Large [^1^]"));
        assert_eq!(q.references(), ["https://a".to_string()]);
    }

    #[test]
    fn refined_analysis_deduplicates_references_in_order() {
        let refined = RefinedAnalysis::new(
            "text",
            ["b", "a", "b", " ", "a", "c"].map(String::from),
        );
        assert_eq!(refined.references(), ["b", "a", "c"].map(String::from));
    }

    #[test]
    fn placeholder_summary_is_recognised() {
        assert!(DocumentSummary::no_documents_found().is_placeholder());
        assert!(!DocumentSummary::new("Real summary", vec!["https://x".into()]).is_placeholder());
    }

    #[test]
    fn complete_analysis_keeps_duplicates() {
        let p = AnalyzedPoint {
            point: "EV sales grew".into(),
            reference: "https://a".into(),
        };
        let mut all = CompleteAnalysis::new();
        all.absorb(vec![p.clone()]);
        all.absorb(vec![p]);
        assert_eq!(all.len(), 2);
    }
}
