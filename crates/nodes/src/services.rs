//! The collaborators a research job runs against.

use std::sync::Arc;

use pipeline::{
    ConversionStrategy, Credential, DocumentFinder, Generator, ResearchError, ResearchSettings,
    SearchProvider,
};

use crate::conversion::ConversionPipeline;
use crate::credentials::CredentialPool;
use crate::structured::StructuredGenerator;

/// Every port implementation and setting a job needs, shared by all of its
/// tasks behind one `Arc`.
pub struct ResearchServices {
    pub(crate) generation: StructuredGenerator,
    pub(crate) search: Arc<dyn SearchProvider>,
    pub(crate) search_credentials: CredentialPool,
    pub(crate) finder: Arc<dyn DocumentFinder>,
    pub(crate) conversion: ConversionPipeline,
    pub(crate) settings: ResearchSettings,
}

impl std::fmt::Debug for ResearchServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchServices")
            .field("search", &self.search.name())
            .field("search_credentials", &self.search_credentials)
            .field("finder", &self.finder.name())
            .field("conversion", &self.conversion)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ResearchServices {
    /// Wires the ports together.
    ///
    /// `strategies` are conversion strategies in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`ResearchError::ConfigurationError`] if `settings` are invalid
    /// or no search credential was supplied.
    pub fn new(
        generator: Arc<dyn Generator>,
        search: Arc<dyn SearchProvider>,
        search_credentials: Vec<Credential>,
        finder: Arc<dyn DocumentFinder>,
        strategies: Vec<Arc<dyn ConversionStrategy>>,
        settings: ResearchSettings,
    ) -> Result<Self, ResearchError> {
        settings.validate()?;
        let search_credentials = CredentialPool::new(search.name(), search_credentials).ok_or_else(|| {
            ResearchError::ConfigurationError {
                message: format!("no credentials configured for search provider '{}'", search.name()),
            }
        })?;

        Ok(Self {
            generation: StructuredGenerator::from_settings(generator, &settings),
            conversion: ConversionPipeline::new(strategies, settings.min_converted_chars),
            search,
            search_credentials,
            finder,
            settings,
        })
    }

    /// The settings jobs run with.
    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }
}
