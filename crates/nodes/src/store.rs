//! In-memory [`JobStore`].
//!
//! Jobs live in a `HashMap` behind a `parking_lot::RwLock`. No lock is held
//! across an `.await`, so the async trait methods complete without yielding.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use pipeline::{
    FinalAnswer, Job, JobId, JobStatus, JobStore, Progress, ResearchError, Stage, SubQuestion,
    Timestamp,
};

/// Process-local job storage.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `change` to a non-terminal job.
    fn modify(&self, id: JobId, change: impl FnOnce(&mut Job)) -> Result<(), ResearchError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&id).ok_or(ResearchError::JobNotFound(id))?;
        if job.status.is_terminal() {
            return Err(ResearchError::JobTerminal(id));
        }
        change(job);
        job.updated_at = Timestamp::now();
        Ok(())
    }
}

fn terminal_progress(current: &Progress, stage: Stage, detail: String) -> Progress {
    Progress {
        total_steps: current.total_steps,
        current_step: if stage == Stage::Completed {
            current.total_steps.max(current.current_step)
        } else {
            current.current_step
        },
        stage,
        detail,
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), ResearchError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(ResearchError::DuplicateJob(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().get(&id).cloned()
    }

    async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    async fn mark_in_progress(&self, id: JobId) -> Result<(), ResearchError> {
        self.modify(id, |job| job.status = JobStatus::InProgress)
    }

    async fn set_sub_questions(
        &self,
        id: JobId,
        sub_questions: Vec<SubQuestion>,
    ) -> Result<(), ResearchError> {
        self.modify(id, |job| job.sub_questions = sub_questions)
    }

    async fn update_progress(&self, id: JobId, progress: Progress) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(&id) else {
            tracing::debug!(job_id = %id, "progress for unknown job ignored");
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        if job.progress.merge(&progress) {
            job.updated_at = Timestamp::now();
        }
    }

    async fn complete(
        &self,
        id: JobId,
        sub_questions: Vec<SubQuestion>,
        answer: FinalAnswer,
    ) -> Result<(), ResearchError> {
        self.modify(id, |job| {
            let progress = terminal_progress(&job.progress, Stage::Completed, "research complete".into());
            job.progress.merge(&progress);
            job.status = JobStatus::Completed;
            job.sub_questions = sub_questions;
            job.answer = Some(answer);
            job.error = None;
        })
    }

    async fn fail(&self, id: JobId, error: String) -> Result<(), ResearchError> {
        self.modify(id, |job| {
            let progress = terminal_progress(&job.progress, Stage::Failed, error.clone());
            job.progress.merge(&progress);
            job.status = JobStatus::Failed;
            job.answer = None;
            job.error = Some(error);
        })
    }
}
