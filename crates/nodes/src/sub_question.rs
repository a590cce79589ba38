//! The per-sub-question pipeline.
//!
//! ```text
//! KeywordsGenerating → EvidenceGathering (keyword ∥ document) → Refining → Synthesizing → SubQuestionCompleted
//! ```
//!
//! The pipeline always reaches `SubQuestionCompleted`. Evidence failures are
//! absorbed by [`EvidenceCollector`]; a failed answer synthesis leaves the
//! sub-question with an empty answer. The sub-question's answer is written
//! exactly once, at the end.

use std::sync::Arc;

use pipeline::{
    consolidate_citations, Stage, SubQuestion, SubQuestionAnswer, SubQuestionIndex,
    SubQuestionOutcome,
};
use tracing::{info, warn};

use crate::evidence::{Evidence, EvidenceCollector};
use crate::progress::SubQuestionProgress;
use crate::services::ResearchServices;
use crate::tasks::AnswerSubQuestion;

/// Runs one sub-question from keywords to cited answer.
#[derive(Debug, Clone)]
pub struct SubQuestionPipeline {
    services: Arc<ResearchServices>,
}

impl SubQuestionPipeline {
    /// Creates a pipeline over `services`.
    pub fn new(services: Arc<ResearchServices>) -> Self {
        Self { services }
    }

    /// Researches and answers `sub_question`.
    ///
    /// `query` is the original research query, passed for context only.
    pub async fn run(
        &self,
        query: &str,
        index: SubQuestionIndex,
        mut sub_question: SubQuestion,
        progress: SubQuestionProgress,
    ) -> SubQuestionOutcome {
        let Evidence { refined, documents } = EvidenceCollector::new(Arc::clone(&self.services))
            .collect(query, &sub_question.question, &progress)
            .await;

        progress.enter(Stage::Synthesizing, "writing answer");
        let output = self
            .services
            .generation
            .generate_or_default(&AnswerSubQuestion {
                sub_question: &sub_question.question,
                refined: &refined,
                documents: &documents,
            })
            .await;
        let answer = consolidate_citations(&output.answer, &output.references);

        if let Err(error) = sub_question.record_answer(SubQuestionAnswer {
            answer: answer.answer,
            references: answer.references,
        }) {
            warn!(%error, "sub-question answer not recorded");
        }

        progress.enter(Stage::SubQuestionCompleted, "completed");
        info!(
            references = sub_question.references().len(),
            answered = sub_question.answer().is_some_and(|a| !a.is_empty()),
            "sub-question completed"
        );

        SubQuestionOutcome {
            index,
            sub_question,
            refined,
            documents,
        }
    }
}
