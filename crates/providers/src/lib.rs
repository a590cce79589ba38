//! Quarry evidence-provider adapters.
//!
//! Implements the evidence ports defined in [`pipeline`] over real services:
//!
//! | Adapter | Port | Service |
//! |---------|------|---------|
//! | [`TavilySearch`] | [`pipeline::SearchProvider`] | Tavily search API |
//! | [`GoogleDocumentFinder`] | [`pipeline::DocumentFinder`] | Google Custom Search JSON API |
//! | [`ReaderServiceStrategy`] | [`pipeline::ConversionStrategy`] | hosted URL-to-text reader |
//! | [`DownloadExtractStrategy`] | [`pipeline::ConversionStrategy`] | direct download + local PDF extraction |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Request formatting, response parsing, temporary files,
//! and the mapping of HTTP failures onto [`pipeline::TransportError`] live
//! here. The orchestration layer sees only the port traits.

pub mod extract;
pub mod google;
mod http;
pub mod reader;
pub mod tavily;

pub use extract::DownloadExtractStrategy;
pub use google::GoogleDocumentFinder;
pub use http::{build_client, ClientError};
pub use reader::ReaderServiceStrategy;
pub use tavily::TavilySearch;
