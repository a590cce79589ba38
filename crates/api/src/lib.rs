//! Quarry job API.
//!
//! Exposes the research orchestrator over HTTP:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /jobs` | submit a query; the job runs in the background |
//! | `GET /jobs` | list every stored job |
//! | `GET /jobs/{id}` | status, progress and failure detail |
//! | `GET /jobs/{id}/result` | answer, references and sub-questions |
//! | `GET /health` | liveness |
//!
//! Errors are returned as `{"error": "<message>"}` with a matching status
//! code (see [`ApiError`]).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Request parsing, response shapes and status-code
//! mapping live here. Job execution and storage belong to the
//! [`nodes::ResearchOrchestrator`] held in [`AppState`].

mod error;
mod handlers;
mod routes;

use std::net::SocketAddr;

use nodes::ResearchOrchestrator;
use tokio::net::TcpListener;
use tracing::info;

pub use error::ApiError;
pub use handlers::{JobDetails, JobResult, JobSummary, SubmitRequest, SubmitResponse};
pub use routes::create_router;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: ResearchOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: ResearchOrchestrator) -> Self {
        Self { orchestrator }
    }
}

/// Binds `addr` and serves the job API until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error if the address cannot be bound or the server fails.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "job API listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
