//! Request handlers and their wire shapes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use pipeline::{Job, JobId, JobStatus, Progress, Stage, SubQuestion, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{ApiError, AppState};

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Body of `POST /jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub query: String,
}

/// `202` response of `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// One entry of `GET /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub query: String,
    pub status: JobStatus,
    pub stage: Stage,
    pub created_at: Timestamp,
}

/// Response of `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub job_id: JobId,
    pub query: String,
    pub status: JobStatus,
    pub progress: Progress,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Response of `GET /jobs/{id}/result` for a terminal job.
///
/// A failed job carries `error` and no answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub answer: Option<String>,
    pub references: Vec<String>,
    pub sub_questions: Vec<SubQuestion>,
    pub error: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            query: job.query.clone(),
            status: job.status,
            stage: job.progress.stage,
            created_at: job.created_at,
        }
    }
}

impl From<Job> for JobDetails {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            query: job.query,
            status: job.status,
            progress: job.progress,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl From<Job> for JobResult {
    fn from(job: Job) -> Self {
        let (answer, references) = match job.answer {
            Some(final_answer) => (Some(final_answer.answer), final_answer.references),
            None => (None, Vec::new()),
        };
        Self {
            job_id: job.id,
            status: job.status,
            answer,
            references,
            sub_questions: job.sub_questions,
            error: job.error,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(crate) async fn health() -> &'static str {
    "ok"
}

pub(crate) async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let job_id = state.orchestrator.submit(&request.query).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Pending,
        }),
    ))
}

pub(crate) async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    let jobs = state.orchestrator.store().list().await;
    Json(jobs.iter().map(JobSummary::from).collect())
}

pub(crate) async fn job_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDetails>, ApiError> {
    let job = load(&state, &id).await?;
    Ok(Json(job.into()))
}

pub(crate) async fn job_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResult>, ApiError> {
    let job = load(&state, &id).await?;
    if !job.status.is_terminal() {
        return Err(ApiError::NotFinished(job.id));
    }
    Ok(Json(job.into()))
}

async fn load(state: &AppState, raw_id: &str) -> Result<Job, ApiError> {
    let id: JobId = raw_id
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("Malformed job id: {raw_id}")))?;
    state
        .orchestrator
        .store()
        .get(id)
        .await
        .ok_or(ApiError::NotFound(id))
}
