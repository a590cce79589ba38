//! Progress tracking and asynchronous persistence.
//!
//! [`ProgressTracker`] owns a job's step counter. Every stage entry advances
//! the counter by one atomic increment, so the step numbers a job reports are
//! strictly increasing no matter how many sub-question tasks report at once.
//! The tracker reports exactly one terminal stage: [`ProgressTracker::finish`]
//! and [`ProgressTracker::fail`] race on a single flag and every report after
//! the flag is set is discarded.
//!
//! [`ChannelProgressSink`] is the production [`ProgressSink`]: `report` pushes
//! onto an unbounded channel and returns immediately; a background writer
//! drains the channel into the [`JobStore`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use pipeline::{JobId, JobStore, Progress, ProgressSink, ProgressUpdate, Stage, SubQuestionIndex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Job-level stage entries: started, decomposing, processing, final
/// synthesis, completed.
pub const JOB_STEPS: u64 = 5;

/// Stage entries per sub-question: keywords, evidence, refining,
/// synthesizing, completed.
pub const SUB_QUESTION_STEPS: u64 = 5;

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

struct TrackerState {
    job_id: JobId,
    sink: Arc<dyn ProgressSink>,
    current: AtomicU64,
    total: AtomicU64,
    terminal: AtomicBool,
}

/// Shared step counter and reporter for one job. Clones share state.
#[derive(Clone)]
pub struct ProgressTracker {
    state: Arc<TrackerState>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("job_id", &self.state.job_id)
            .field("current", &self.state.current.load(Ordering::SeqCst))
            .field("total", &self.state.total.load(Ordering::SeqCst))
            .field("terminal", &self.state.terminal.load(Ordering::SeqCst))
            .finish()
    }
}

impl ProgressTracker {
    /// Creates a tracker for `job_id` with the job-level step budget.
    pub fn new(job_id: JobId, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            state: Arc::new(TrackerState {
                job_id,
                sink,
                current: AtomicU64::new(0),
                total: AtomicU64::new(JOB_STEPS),
                terminal: AtomicBool::new(false),
            }),
        }
    }

    /// The job this tracker reports for.
    pub fn job_id(&self) -> JobId {
        self.state.job_id
    }

    /// The last step number handed out.
    pub fn current_step(&self) -> u64 {
        self.state.current.load(Ordering::SeqCst)
    }

    /// The current step budget.
    pub fn total_steps(&self) -> u64 {
        self.state.total.load(Ordering::SeqCst)
    }

    /// Whether a terminal stage has been reported.
    pub fn is_terminal(&self) -> bool {
        self.state.terminal.load(Ordering::SeqCst)
    }

    /// Grows the step budget once the number of sub-questions is known.
    pub fn add_sub_questions(&self, count: usize) {
        self.state
            .total
            .fetch_add(count as u64 * SUB_QUESTION_STEPS, Ordering::SeqCst);
    }

    /// Reports entry into a job-level stage.
    pub fn enter(&self, stage: Stage, detail: impl Into<String>) {
        self.advance(None, stage, detail.into());
    }

    /// A reporter scoped to one sub-question.
    pub fn sub_question(&self, index: SubQuestionIndex) -> SubQuestionProgress {
        SubQuestionProgress {
            tracker: self.clone(),
            index,
        }
    }

    /// Reports [`Stage::Completed`]. Returns `false` if a terminal stage was
    /// already reported.
    pub fn finish(&self) -> bool {
        if !self.claim_terminal() {
            return false;
        }
        let total = self.total_steps();
        let current = self.state.current.fetch_max(total, Ordering::SeqCst).max(total);
        self.emit(None, current, Stage::Completed, "research complete".to_string());
        true
    }

    /// Reports [`Stage::Failed`] with `detail`. Returns `false` if a terminal
    /// stage was already reported.
    pub fn fail(&self, detail: impl Into<String>) -> bool {
        if !self.claim_terminal() {
            return false;
        }
        let current = self.current_step();
        self.emit(None, current, Stage::Failed, detail.into());
        true
    }

    fn claim_terminal(&self) -> bool {
        self.state
            .terminal
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn advance(&self, sub_question: Option<SubQuestionIndex>, stage: Stage, detail: String) {
        if self.is_terminal() {
            return;
        }
        let step = self.state.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(sub_question, step, stage, detail);
    }

    fn emit(&self, sub_question: Option<SubQuestionIndex>, step: u64, stage: Stage, detail: String) {
        let total = self.total_steps().max(step);
        tracing::debug!(
            job_id = %self.state.job_id,
            step,
            total,
            stage = %stage,
            detail = %detail,
            "progress"
        );
        self.state.sink.report(ProgressUpdate {
            job_id: self.state.job_id,
            sub_question,
            progress: Progress {
                total_steps: total,
                current_step: step,
                stage,
                detail,
            },
        });
    }
}

/// Progress reporter for one sub-question pipeline.
#[derive(Debug, Clone)]
pub struct SubQuestionProgress {
    tracker: ProgressTracker,
    index: SubQuestionIndex,
}

impl SubQuestionProgress {
    /// The sub-question this reporter is scoped to.
    pub fn index(&self) -> SubQuestionIndex {
        self.index
    }

    /// Reports entry into a sub-question stage.
    pub fn enter(&self, stage: Stage, detail: impl Into<String>) {
        let detail = format!("sub-question {}: {}", self.index.as_usize() + 1, detail.into());
        self.tracker.advance(Some(self.index), stage, detail);
    }
}

// ---------------------------------------------------------------------------
// Channel sink and writer
// ---------------------------------------------------------------------------

/// Fire-and-forget [`ProgressSink`] backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgressSink {
    /// Creates the sink and spawns the writer that persists every update into
    /// `store`. The writer exits once every clone of the sink is dropped.
    pub fn spawn(store: Arc<dyn JobStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        let writer = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                store.update_progress(update.job_id, update.progress).await;
            }
            tracing::debug!("progress writer stopped");
        });
        (Self { tx }, writer)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, update: ProgressUpdate) {
        if self.tx.send(update).is_err() {
            tracing::warn!("progress writer is gone; update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use pipeline::{Job, JobStatus};

    use super::*;
    use crate::store::InMemoryJobStore;

    #[derive(Default)]
    struct Recording(Mutex<Vec<ProgressUpdate>>);

    impl ProgressSink for Recording {
        fn report(&self, update: ProgressUpdate) {
            self.0.lock().push(update);
        }
    }

    #[test]
    fn steps_increase_and_exactly_one_terminal_is_reported() {
        let sink = Arc::new(Recording::default());
        let tracker = ProgressTracker::new(JobId::new_random(), sink.clone());

        tracker.enter(Stage::Started, "started");
        tracker.enter(Stage::DecomposingQuery, "decomposing");
        tracker.add_sub_questions(2);
        tracker.sub_question(SubQuestionIndex::new(1)).enter(Stage::KeywordsGenerating, "keywords");
        assert!(tracker.finish());
        assert!(!tracker.fail("late failure"));
        tracker.enter(Stage::SynthesizingFinal, "late report");

        let updates = sink.0.lock();
        let steps: Vec<u64> = updates.iter().map(|u| u.progress.current_step).collect();
        assert_eq!(steps, vec![1, 2, 3, JOB_STEPS + 2 * SUB_QUESTION_STEPS]);
        assert_eq!(updates[2].sub_question, Some(SubQuestionIndex::new(1)));
        assert!(updates[2].progress.detail.starts_with("sub-question 2:"));
        let terminals = updates.iter().filter(|u| u.progress.stage.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(updates.iter().all(|u| u.progress.current_step <= u.progress.total_steps));
    }

    #[test]
    fn failure_keeps_the_current_step() {
        let sink = Arc::new(Recording::default());
        let tracker = ProgressTracker::new(JobId::new_random(), sink.clone());
        tracker.enter(Stage::Started, "started");
        assert!(tracker.fail("decomposition failed"));

        let last = sink.0.lock().last().cloned().expect("terminal update");
        assert_eq!(last.progress.stage, Stage::Failed);
        assert_eq!(last.progress.current_step, 1);
        assert_eq!(last.progress.detail, "decomposition failed");
    }

    #[tokio::test]
    async fn channel_sink_persists_into_the_store() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = JobId::new_random();
        store.insert(Job::new(id, "q")).await.expect("fresh id");

        let (sink, writer) = ChannelProgressSink::spawn(store.clone());
        let tracker = ProgressTracker::new(id, Arc::new(sink));
        tracker.enter(Stage::Started, "started");
        tracker.enter(Stage::DecomposingQuery, "decomposing");
        drop(tracker);
        writer.await.expect("writer exits when the sink is dropped");

        let job = store.get(id).await.expect("stored");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress.current_step, 2);
        assert_eq!(job.progress.stage, Stage::DecomposingQuery);
    }
}
