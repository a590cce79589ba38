//! The [`Generator`] port: schema-constrained text generation.
//!
//! The orchestration layer never builds provider requests. It describes a
//! task (a name, a system prompt, a user prompt, and the JSON Schema its
//! output must satisfy) and receives either a JSON value or a typed error
//! that says whether the model was unreachable ([`GenerateError::Transport`])
//! or answered in the wrong shape ([`GenerateError::Parse`]).
//!
//! ## Architectural Layer
//!
//! **Port definition.** HTTP transport, model selection, rate-limit handling
//! and response decoding live in the `llm` crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::GenerateError;

/// Which model class a request is meant for.
///
/// Reformat recovery is a narrow, mechanical task and is routed to a cheaper,
/// stricter model when the adapter is configured with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// The primary analysis model.
    Primary,
    /// The model used to restructure malformed output.
    Reformat,
}

/// A single structured generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Stable task name, used as the schema name and in logs.
    pub task: &'static str,
    /// Instructions for the model.
    pub system_prompt: String,
    /// The task input.
    pub user_prompt: String,
    /// JSON Schema the output must satisfy.
    pub schema: Value,
    /// Model class to route the request to.
    pub tier: ModelTier,
}

/// Schema-constrained text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Runs one generation request.
    ///
    /// # Errors
    ///
    /// - [`GenerateError::Transport`] when the provider could not be reached
    ///   or rejected the request.
    /// - [`GenerateError::Parse`] when the provider answered with content that
    ///   is not valid JSON; the raw content is carried in the error.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerateError>;
}
