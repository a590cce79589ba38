use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline::{JobId, ResearchError};
use serde_json::json;
use thiserror::Error;

/// Failure of an API request, rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or path is unusable. `400`.
    #[error("{0}")]
    InvalidInput(String),

    /// No such job. `404`.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The job exists but has no result yet. `409`.
    #[error("Job {0} has not finished")]
    NotFinished(JobId),

    /// Anything the caller cannot fix. `500`.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotFinished(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ResearchError> for ApiError {
    fn from(error: ResearchError) -> Self {
        match error {
            ResearchError::EmptyQuery => ApiError::InvalidInput(error.to_string()),
            ResearchError::JobNotFound(id) => ApiError::NotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_errors_map_to_client_and_server_statuses() {
        let id = JobId::new_random();
        assert_eq!(ApiError::from(ResearchError::EmptyQuery).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(ResearchError::JobNotFound(id)).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ResearchError::DuplicateJob(id)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
