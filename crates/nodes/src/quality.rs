//! Quality gates: "is this artefact good enough to keep?"
//!
//! Gates are applied after conversion (is the extracted text substantial?),
//! after web search (did the provider return anything?), and after document
//! analysis (is there enough signal to be worth summarising?). A rejected
//! artefact is dropped, never retried by the gate itself; whether a rejection
//! triggers a retry is the caller's decision.
//!
//! Parse failures of structured generation are the other half of quality
//! control and are handled by reformat recovery in [`crate::structured`].

use pipeline::{DocumentAnalysis, QualityError};

/// A reusable acceptance predicate for artefacts of type `A`.
pub trait QualityGate<A: ?Sized> {
    /// Returns `Ok` if the artefact is acceptable, or the reason it is not.
    fn check(&self, artifact: &A) -> Result<(), QualityError>;

    /// Returns `true` if the artefact is acceptable. Rejections are logged at
    /// debug level.
    fn accept(&self, artifact: &A) -> bool {
        match self.check(artifact) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::debug!(%rejection, "quality gate rejected artefact");
                false
            }
        }
    }
}

/// Rejects text that is blank or shorter than a character floor.
///
/// Length is measured in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinLength {
    artifact: &'static str,
    min_chars: usize,
}

impl MinLength {
    /// A gate requiring at least `min_chars` characters.
    pub fn new(artifact: &'static str, min_chars: usize) -> Self {
        Self { artifact, min_chars }
    }

    /// A gate that only rejects blank text.
    pub fn non_empty(artifact: &'static str) -> Self {
        Self::new(artifact, 1)
    }

    /// The character floor.
    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    fn reject(&self, reason: String) -> QualityError {
        QualityError {
            artifact: self.artifact.to_string(),
            reason,
        }
    }
}

impl QualityGate<str> for MinLength {
    fn check(&self, text: &str) -> Result<(), QualityError> {
        if text.trim().is_empty() {
            return Err(self.reject("empty".to_string()));
        }
        let chars = text.chars().count();
        if chars < self.min_chars {
            return Err(self.reject(format!(
                "{chars} characters, below the floor of {}",
                self.min_chars
            )));
        }
        Ok(())
    }
}

impl QualityGate<DocumentAnalysis> for MinLength {
    fn check(&self, analysis: &DocumentAnalysis) -> Result<(), QualityError> {
        QualityGate::<str>::check(self, &analysis.analysis).map_err(|mut e| {
            e.reason = format!("{} ({})", e.reason, analysis.url);
            e
        })
    }
}
