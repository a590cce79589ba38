//! Quarry generation infrastructure adapter.
//!
//! Implements the [`pipeline::Generator`] trait for any service that speaks the
//! OpenAI chat-completions protocol with JSON-schema response formats. Further
//! providers are added as new implementations in this crate without any
//! changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing,
//! and the mapping of HTTP failures onto [`pipeline::TransportError`] and its
//! retry policy live here. The orchestration layer sees only
//! [`pipeline::Generator`].

pub mod openai;

pub use openai::{LlmError, OpenAiCompatibleGenerator, OpenAiConfig};
