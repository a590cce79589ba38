//! The research orchestrator: one job from query to final answer.
//!
//! ```text
//! Started → DecomposingQuery → ProcessingSubQuestions (all in parallel) → SynthesizingFinal → Completed | Failed
//! ```
//!
//! Decomposition and final synthesis have no degraded fallback: if either
//! cannot reach the model after its retries, or decomposition yields no
//! sub-questions, the job is marked `Failed` with the error detail and no
//! answer is stored. Everything in between is isolated per sub-question: a
//! sub-question task that panics is recorded unanswered with empty evidence
//! and the job carries on.
//!
//! Format notes from decomposition are passed to final synthesis only.

use std::sync::Arc;

use pipeline::{
    consolidate_citations, FinalAnswer, Job, JobId, JobStore, ProgressSink, ReferenceList,
    ResearchError, Stage, SubQuestion, SubQuestionIndex, SubQuestionOutcome,
};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::progress::ProgressTracker;
use crate::services::ResearchServices;
use crate::sub_question::SubQuestionPipeline;
use crate::tasks::{DecomposeQuery, SynthesizeFinal};

/// Submits and runs research jobs against a [`JobStore`].
///
/// Cloning is cheap; clones share the store, sink and services.
#[derive(Clone)]
pub struct ResearchOrchestrator {
    services: Arc<ResearchServices>,
    store: Arc<dyn JobStore>,
    sink: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for ResearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchOrchestrator")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl ResearchOrchestrator {
    /// Creates an orchestrator. Progress reports go to `sink`; job state is
    /// read from and written to `store`.
    pub fn new(
        services: Arc<ResearchServices>,
        store: Arc<dyn JobStore>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            services,
            store,
            sink,
        }
    }

    /// The job store this orchestrator writes to.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Stores a pending job for `query` and starts it in the background.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::EmptyQuery`] for a blank query, or the store's
    /// error if the job could not be inserted.
    pub async fn submit(&self, query: &str) -> Result<JobId, ResearchError> {
        let id = self.create(query).await?;
        let orchestrator = self.clone();
        tokio::spawn(async move {
            // Failures are recorded on the job itself.
            let _ = orchestrator.run(id).await;
        });
        Ok(id)
    }

    /// Runs a job for `query` to its terminal state and returns the stored
    /// job, whether it completed or failed.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::EmptyQuery`] for a blank query, or a store
    /// error if the job record could not be created or read back.
    pub async fn research(&self, query: &str) -> Result<Job, ResearchError> {
        let id = self.create(query).await?;
        if let Err(e) = self.run(id).await {
            warn!(job_id = %id, error = %e, "research job failed");
        }
        self.store.get(id).await.ok_or(ResearchError::JobNotFound(id))
    }

    /// Runs the stored job `id` to its terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::Fatal`] if decomposition or final synthesis
    /// failed (the job is then `Failed`), or a store error if the job is
    /// unknown or not runnable.
    pub async fn run(&self, id: JobId) -> Result<FinalAnswer, ResearchError> {
        let job = self.store.get(id).await.ok_or(ResearchError::JobNotFound(id))?;
        let span = info_span!("research_job", job_id = %id);
        self.execute(job).instrument(span).await
    }

    async fn create(&self, query: &str) -> Result<JobId, ResearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResearchError::EmptyQuery);
        }
        let id = JobId::new_random();
        self.store.insert(Job::new(id, query)).await?;
        info!(job_id = %id, "research job submitted");
        Ok(id)
    }

    async fn execute(&self, job: Job) -> Result<FinalAnswer, ResearchError> {
        let id = job.id;
        self.store.mark_in_progress(id).await?;

        let tracker = ProgressTracker::new(id, Arc::clone(&self.sink));
        tracker.enter(Stage::Started, "research started");
        info!(query = %job.query, "research started");

        match self.research_stages(id, &job.query, &tracker).await {
            Ok((sub_questions, answer)) => {
                self.store.complete(id, sub_questions, answer.clone()).await?;
                tracker.finish();
                info!(references = answer.references.len(), "research completed");
                Ok(answer)
            }
            Err(failure) => {
                error!(error = %failure, "research failed");
                self.store.fail(id, failure.to_string()).await?;
                tracker.fail(failure.to_string());
                Err(failure)
            }
        }
    }

    async fn research_stages(
        &self,
        id: JobId,
        query: &str,
        tracker: &ProgressTracker,
    ) -> Result<(Vec<SubQuestion>, FinalAnswer), ResearchError> {
        tracker.enter(Stage::DecomposingQuery, "breaking the query into sub-questions");
        let plan = self
            .services
            .generation
            .generate(&DecomposeQuery { query })
            .await
            .map_err(|e| ResearchError::Fatal {
                stage: Stage::DecomposingQuery,
                message: e.to_string(),
            })?;

        let sub_questions: Vec<SubQuestion> = plan
            .questions
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(SubQuestion::new)
            .collect();
        if sub_questions.is_empty() {
            return Err(ResearchError::Fatal {
                stage: Stage::DecomposingQuery,
                message: "the query produced no sub-questions".to_string(),
            });
        }
        self.store.set_sub_questions(id, sub_questions.clone()).await?;

        let count = sub_questions.len();
        tracker.add_sub_questions(count);
        tracker.enter(
            Stage::ProcessingSubQuestions,
            format!("researching {count} sub-questions"),
        );
        info!(sub_questions = count, "query decomposed");

        let outcomes = self.process_sub_questions(query, sub_questions, tracker).await;

        tracker.enter(Stage::SynthesizingFinal, "writing the final answer");
        let answer = self.synthesize(query, &plan.format_notes, &outcomes).await?;
        let sub_questions = outcomes.into_iter().map(|o| o.sub_question).collect();
        Ok((sub_questions, answer))
    }

    /// Runs every sub-question concurrently and returns their outcomes in
    /// decomposition order.
    async fn process_sub_questions(
        &self,
        query: &str,
        sub_questions: Vec<SubQuestion>,
        tracker: &ProgressTracker,
    ) -> Vec<SubQuestionOutcome> {
        let mut tasks = JoinSet::new();
        for (position, sub_question) in sub_questions.iter().cloned().enumerate() {
            let index = SubQuestionIndex::new(position);
            let pipeline = SubQuestionPipeline::new(Arc::clone(&self.services));
            let progress = tracker.sub_question(index);
            let query = query.to_string();
            let span = info_span!("sub_question", index = position + 1);
            tasks.spawn(
                async move { pipeline.run(&query, index, sub_question, progress).await }
                    .instrument(span),
            );
        }

        let mut slots: Vec<Option<SubQuestionOutcome>> = sub_questions.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Some(slot) = slots.get_mut(outcome.index.as_usize()) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => error!(error = %e, "sub-question task aborted; recording it unanswered"),
            }
        }

        slots
            .into_iter()
            .zip(sub_questions)
            .enumerate()
            .map(|(position, (slot, sub_question))| {
                slot.unwrap_or_else(|| {
                    SubQuestionOutcome::empty(SubQuestionIndex::new(position), sub_question)
                })
            })
            .collect()
    }

    async fn synthesize(
        &self,
        query: &str,
        format_notes: &str,
        outcomes: &[SubQuestionOutcome],
    ) -> Result<FinalAnswer, ResearchError> {
        let mut references = ReferenceList::new();
        for outcome in outcomes {
            references.extend(outcome.refined.references());
            references.extend(outcome.documents.references());
        }

        let output = self
            .services
            .generation
            .generate(&SynthesizeFinal {
                query,
                format_notes,
                outcomes,
                references: &references,
            })
            .await
            .map_err(|e| ResearchError::Fatal {
                stage: Stage::SynthesizingFinal,
                message: e.to_string(),
            })?;
        if output.answer.trim().is_empty() {
            warn!("final synthesis produced an empty answer");
        }

        // Markers index the model's own reference list when it returns one,
        // otherwise the consolidated list it was shown.
        let cited = if output.references.is_empty() {
            references.into_vec()
        } else {
            let mut cited = output.references;
            cited.extend(references.into_vec());
            cited
        };
        Ok(consolidate_citations(&output.answer, &cited))
    }
}
