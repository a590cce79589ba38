use std::sync::Arc;
use std::time::Duration;

use api::{create_router, AppState, JobDetails, JobResult, JobSummary, SubmitResponse};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use nodes::{InMemoryJobStore, ResearchOrchestrator, ResearchServices};
use pipeline::{
    ConversionStrategy, Credential, DiscoveryLimits, DocumentFinder, DocumentUrl, FinalAnswer,
    GenerateError, GenerationRequest, Generator, Job, JobId, JobStatus, JobStore, Keyword,
    ProgressSink, ProgressUpdate, ResearchSettings, SearchProvider, Stage, SubQuestion,
    SubQuestionAnswer, TransportError,
};
use serde_json::{json, Value};

// ============= Test doubles =============

/// Every generation call fails, so submitted jobs fail at decomposition.
struct UnreachableModel;

#[async_trait]
impl Generator for UnreachableModel {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Value, GenerateError> {
        Err(TransportError::fatal("test-model", "model offline").into())
    }
}

struct NoSearch;

#[async_trait]
impl SearchProvider for NoSearch {
    fn name(&self) -> &str {
        "no-search"
    }

    async fn search(&self, _keyword: &Keyword, _credential: &Credential) -> Result<String, TransportError> {
        Ok(String::new())
    }
}

struct NoDocuments;

#[async_trait]
impl DocumentFinder for NoDocuments {
    fn name(&self) -> &str {
        "no-documents"
    }

    async fn find_documents(
        &self,
        _keywords: &[Keyword],
        _limits: DiscoveryLimits,
    ) -> Result<Vec<DocumentUrl>, TransportError> {
        Ok(Vec::new())
    }
}

struct EmptyConversion;

#[async_trait]
impl ConversionStrategy for EmptyConversion {
    fn name(&self) -> &str {
        "empty"
    }

    async fn convert(&self, _url: &DocumentUrl) -> Result<String, TransportError> {
        Ok(String::new())
    }
}

struct DiscardProgress;

impl ProgressSink for DiscardProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

// ============= Helpers =============

fn setup() -> (TestServer, Arc<InMemoryJobStore>) {
    let services = ResearchServices::new(
        Arc::new(UnreachableModel),
        Arc::new(NoSearch),
        vec![Credential::new("search-key").expect("non-empty")],
        Arc::new(NoDocuments),
        vec![Arc::new(EmptyConversion) as Arc<dyn ConversionStrategy>],
        ResearchSettings {
            generation_attempts: 1,
            ..ResearchSettings::default()
        },
    )
    .expect("valid services");
    let store = Arc::new(InMemoryJobStore::new());
    let orchestrator = ResearchOrchestrator::new(
        Arc::new(services),
        store.clone() as Arc<dyn JobStore>,
        Arc::new(DiscardProgress),
    );
    let server = TestServer::new(create_router(AppState::new(orchestrator))).expect("Failed to create test server");
    (server, store)
}

async fn stored_job(store: &InMemoryJobStore, query: &str) -> JobId {
    let id = JobId::new_random();
    store.insert(Job::new(id, query)).await.expect("fresh id");
    id
}

// ============= Health =============

#[tokio::test]
async fn health_reports_ok() {
    let (server, _) = setup();
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

// ============= Submission =============

#[tokio::test]
async fn submission_is_accepted_and_runs_in_the_background() {
    let (server, store) = setup();

    let response = server
        .post("/jobs")
        .json(&json!({ "query": "Electric vehicle adoption in India" }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let accepted: SubmitResponse = response.json();
    assert_eq!(accepted.status, JobStatus::Pending);

    // The unreachable model fails decomposition; wait for the terminal state.
    let mut job = None;
    for _ in 0..100 {
        let current = store.get(accepted.job_id).await.expect("stored");
        if current.status.is_terminal() {
            job = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let job = job.expect("job reaches a terminal state");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.query, "Electric vehicle adoption in India");
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let (server, store) = setup();

    let response = server.post("/jobs").json(&json!({ "query": "   " })).await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "Research query must not be empty");
    assert!(store.list().await.is_empty());
}

// ============= Listing and status =============

#[tokio::test]
async fn listing_returns_jobs_oldest_first() {
    let (server, store) = setup();
    let first = stored_job(&store, "first query").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = stored_job(&store, "second query").await;

    let jobs: Vec<JobSummary> = server.get("/jobs").await.json();

    let ids: Vec<JobId> = jobs.iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending && j.stage == Stage::Started));
}

#[tokio::test]
async fn status_includes_progress_and_failure_detail() {
    let (server, store) = setup();
    let id = stored_job(&store, "query").await;
    store.mark_in_progress(id).await.expect("pending job");
    store.fail(id, "decomposing failed: model offline".into()).await.expect("running job");

    let response = server.get(&format!("/jobs/{id}")).await;

    response.assert_status_ok();
    let details: JobDetails = response.json();
    assert_eq!(details.status, JobStatus::Failed);
    assert_eq!(details.progress.stage, Stage::Failed);
    assert_eq!(details.error.as_deref(), Some("decomposing failed: model offline"));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (server, _) = setup();
    let id = JobId::new_random();

    server.get(&format!("/jobs/{id}")).await.assert_status_not_found();
    server.get(&format!("/jobs/{id}/result")).await.assert_status_not_found();
}

#[tokio::test]
async fn malformed_job_id_is_a_bad_request() {
    let (server, _) = setup();

    let response = server.get("/jobs/not-a-uuid").await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "Malformed job id: not-a-uuid");
}

// ============= Results =============

#[tokio::test]
async fn result_of_an_unfinished_job_is_a_conflict() {
    let (server, store) = setup();
    let id = stored_job(&store, "query").await;
    store.mark_in_progress(id).await.expect("pending job");

    server
        .get(&format!("/jobs/{id}/result"))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn completed_job_returns_answer_references_and_sub_questions() {
    let (server, store) = setup();
    let id = stored_job(&store, "EV market India").await;
    store.mark_in_progress(id).await.expect("pending job");
    let mut sub_question = SubQuestion::new("What are current EV sales?");
    sub_question
        .record_answer(SubQuestionAnswer {
            answer: "Sales doubled [^1^].".into(),
            references: vec!["https://a.example".into()],
        })
        .expect("first answer");
    store
        .complete(
            id,
            vec![sub_question],
            FinalAnswer {
                answer: "The market grew [^1^].".into(),
                references: vec!["https://a.example".into()],
            },
        )
        .await
        .expect("running job");

    let response = server.get(&format!("/jobs/{id}/result")).await;

    response.assert_status_ok();
    let result: JobResult = response.json();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.answer.as_deref(), Some("The market grew [^1^]."));
    assert_eq!(result.references, vec!["https://a.example".to_string()]);
    assert_eq!(result.sub_questions.len(), 1);
    assert_eq!(result.sub_questions[0].answer(), Some("Sales doubled [^1^]."));
    assert_eq!(result.error, None);
}

#[tokio::test]
async fn failed_job_result_carries_the_error_and_no_answer() {
    let (server, store) = setup();
    let id = stored_job(&store, "query").await;
    store.fail(id, "synthesizing_final failed: 503".into()).await.expect("pending job");

    let response = server.get(&format!("/jobs/{id}/result")).await;

    response.assert_status_ok();
    let result: JobResult = response.json();
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.answer, None);
    assert!(result.references.is_empty());
    assert_eq!(result.error.as_deref(), Some("synthesizing_final failed: 503"));
}
