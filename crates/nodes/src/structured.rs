//! Schema-constrained generation with bounded retry and reformat recovery.
//!
//! [`StructuredGenerator`] turns a [`StructuredTask`] into its typed output:
//!
//! 1. The task's request is sent through the [`Generator`] port. Transport
//!    failures are retried up to `generation_attempts` times under the
//!    error's [`pipeline::RetryPolicy`].
//! 2. Output that does not parse against the task's schema is handed to
//!    reformat recovery: a narrow request to the cheaper model tier asking it
//!    to restructure the raw output, tried `reformat_attempts` times.
//! 3. If recovery also fails the task's empty default is returned.
//!
//! Parse failures therefore never escape. Transport failures that survive
//! every retry are returned to the caller, which either degrades (per-artefact
//! stages) or fails the job (decomposition and final synthesis).

use std::sync::Arc;

use pipeline::{GenerateError, Generator, ParseError, ResearchSettings, TransportError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::retry::{AttemptFailure, RetryExecutor};
use crate::tasks::{reformat_request, StructuredTask};

/// Runs structured tasks against a [`Generator`].
#[derive(Clone)]
pub struct StructuredGenerator {
    generator: Arc<dyn Generator>,
    retry: RetryExecutor,
    reformat_attempts: u32,
}

impl std::fmt::Debug for StructuredGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredGenerator")
            .field("retry", &self.retry)
            .field("reformat_attempts", &self.reformat_attempts)
            .finish_non_exhaustive()
    }
}

impl StructuredGenerator {
    /// Creates a generator with explicit retry budgets.
    pub fn new(generator: Arc<dyn Generator>, generation_attempts: u32, reformat_attempts: u32) -> Self {
        Self {
            generator,
            retry: RetryExecutor::new(generation_attempts),
            reformat_attempts,
        }
    }

    /// Creates a generator with the budgets from `settings`.
    pub fn from_settings(generator: Arc<dyn Generator>, settings: &ResearchSettings) -> Self {
        let mut structured = Self::new(
            generator,
            settings.generation_attempts,
            settings.reformat_attempts,
        );
        structured.retry = structured.retry.with_max_delay(settings.max_retry_delay());
        structured
    }

    /// Runs `task` and returns its typed output.
    ///
    /// # Errors
    ///
    /// Returns the last [`TransportError`] when every attempt failed to reach
    /// the model. Unparseable output is never an error: it is recovered or
    /// replaced by the task's default.
    pub async fn generate<T: StructuredTask>(&self, task: &T) -> Result<T::Output, TransportError> {
        let request = task.request();
        let pending = &request;
        let outcome = self
            .retry
            .execute(
                T::NAME,
                |_| async move {
                    match self.generator.generate(pending).await {
                        Ok(value) => Ok(parse::<T>(&value)),
                        Err(GenerateError::Parse(e)) => Ok(Err(e)),
                        Err(GenerateError::Transport(e)) => Err(e),
                    }
                },
                |_| true,
                |_, _| {},
            )
            .await;

        match outcome.into_result() {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(parse_failure)) => Ok(self.recover::<T>(request.schema, parse_failure).await),
            Err(Some(AttemptFailure::Error(e))) => Err(e),
            Err(_) => Err(TransportError::retryable(
                T::NAME,
                "generation exhausted without an attempt result",
            )),
        }
    }

    /// Runs `task`, substituting its empty default when the model is
    /// unreachable.
    pub async fn generate_or_default<T: StructuredTask>(&self, task: &T) -> T::Output {
        match self.generate(task).await {
            Ok(output) => output,
            Err(error) => {
                warn!(task = T::NAME, %error, "generation failed; using empty result");
                T::Output::default()
            }
        }
    }

    async fn recover<T: StructuredTask>(&self, schema: Value, failure: ParseError) -> T::Output {
        warn!(task = T::NAME, error = %failure, "output failed to parse; attempting reformat");

        for attempt in 1..=self.reformat_attempts {
            let request = reformat_request(T::NAME, schema.clone(), &failure.raw);
            match self.generator.generate(&request).await {
                Ok(value) => match parse::<T>(&value) {
                    Ok(output) => {
                        debug!(task = T::NAME, attempt, "reformat recovered output");
                        return output;
                    }
                    Err(e) => warn!(task = T::NAME, attempt, error = %e, "reformatted output still invalid"),
                },
                Err(e) => warn!(task = T::NAME, attempt, error = %e, "reformat request failed"),
            }
        }

        warn!(task = T::NAME, "reformat recovery exhausted; using empty result");
        T::Output::default()
    }
}

fn parse<T: StructuredTask>(value: &Value) -> Result<T::Output, ParseError> {
    T::Output::deserialize(value).map_err(|e| ParseError {
        task: T::NAME.to_string(),
        message: e.to_string(),
        raw: value.to_string(),
    })
}
