//! Tunable limits and thresholds for a research run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DiscoveryLimits, ResearchError};

/// Research engine settings, loaded from the `[research]` configuration
/// section. Every field has a default, so the section may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResearchSettings {
    /// Web-search keywords generated per sub-question.
    pub keyword_count: usize,
    /// Document-oriented keywords generated per sub-question.
    pub file_keyword_count: usize,
    /// Attempts per keyword search, each with a different credential.
    pub search_attempts: u32,
    /// Attempts per generation call on transport failure.
    pub generation_attempts: u32,
    /// Reformat-recovery calls allowed after a parse failure.
    pub reformat_attempts: u32,
    /// Maximum document URLs collected per sub-question.
    pub document_max_results: usize,
    /// Maximum search results inspected per sub-question.
    pub document_max_attempts: usize,
    /// Minimum converted text length for a conversion strategy to be accepted.
    pub min_converted_chars: usize,
    /// Minimum document analysis length for it to reach the summary.
    pub min_document_analysis_chars: usize,
    /// Upper bound, in seconds, on any provider-requested Retry-After wait.
    pub max_retry_delay_secs: u64,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            keyword_count: 5,
            file_keyword_count: 5,
            search_attempts: 3,
            generation_attempts: 3,
            reformat_attempts: 1,
            document_max_results: 30,
            document_max_attempts: 10,
            min_converted_chars: 3000,
            min_document_analysis_chars: 2000,
            max_retry_delay_secs: 30,
        }
    }
}

impl ResearchSettings {
    /// Discovery bounds derived from these settings.
    pub fn discovery_limits(&self) -> DiscoveryLimits {
        DiscoveryLimits {
            max_results: self.document_max_results,
            max_attempts: self.document_max_attempts,
        }
    }

    /// The longest a retry will wait on a provider's Retry-After hint.
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    /// Checks that every count and attempt budget is usable.
    ///
    /// `reformat_attempts` may be zero (recovery disabled); every other
    /// budget must be at least one.
    pub fn validate(&self) -> Result<(), ResearchError> {
        let checks = [
            ("keyword_count", self.keyword_count == 0),
            ("file_keyword_count", self.file_keyword_count == 0),
            ("search_attempts", self.search_attempts == 0),
            ("generation_attempts", self.generation_attempts == 0),
            ("document_max_results", self.document_max_results == 0),
            ("document_max_attempts", self.document_max_attempts == 0),
        ];
        match checks.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ResearchError::ConfigurationError {
                message: format!("research.{field} must be at least 1"),
            }),
            None => Ok(()),
        }
    }
}
