use axum::routing::get;
use axum::Router;

use crate::{handlers, AppState};

/// Builds the job API router over `state`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs", get(handlers::list_jobs).post(handlers::submit_job))
        .route("/jobs/{id}", get(handlers::job_details))
        .route("/jobs/{id}/result", get(handlers::job_result))
        .with_state(state)
}
