//! Document-to-text conversion with a quality-gated fallback chain.
//!
//! Strategies run in priority order. The first output that passes the
//! [`MinLength`] gate wins and later strategies are never invoked. When no
//! output passes, the final strategy's output is returned as a best effort;
//! that is the empty string if the final strategy failed. Conversion never
//! fails.

use std::sync::Arc;

use pipeline::{ConversionStrategy, DocumentUrl};
use tracing::{debug, warn};

use crate::quality::{MinLength, QualityGate};

/// Ordered chain of [`ConversionStrategy`] implementations.
#[derive(Clone)]
pub struct ConversionPipeline {
    strategies: Vec<Arc<dyn ConversionStrategy>>,
    gate: MinLength,
}

impl std::fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .field("gate", &self.gate)
            .finish()
    }
}

impl ConversionPipeline {
    /// Creates a pipeline over `strategies` (highest priority first) that
    /// accepts output of at least `min_chars` characters.
    pub fn new(strategies: Vec<Arc<dyn ConversionStrategy>>, min_chars: usize) -> Self {
        Self {
            strategies,
            gate: MinLength::new("converted text", min_chars),
        }
    }

    /// Number of strategies in the chain.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// `true` if the chain has no strategies; such a pipeline always yields "".
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Converts `url` to text.
    pub async fn convert(&self, url: &DocumentUrl) -> String {
        let mut last = String::new();

        for strategy in &self.strategies {
            match strategy.convert(url).await {
                Ok(text) => {
                    if self.gate.accept(text.as_str()) {
                        debug!(%url, strategy = strategy.name(), chars = text.chars().count(), "document converted");
                        return text;
                    }
                    debug!(%url, strategy = strategy.name(), "conversion output below threshold; falling back");
                    last = text;
                }
                Err(error) => {
                    warn!(%url, strategy = strategy.name(), %error, "conversion strategy failed; falling back");
                    last = String::new();
                }
            }
        }

        last
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pipeline::TransportError;

    use super::*;

    struct Fixed {
        name: &'static str,
        output: Result<String, TransportError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(name: &'static str, chars: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                output: Ok("a".repeat(chars)),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                output: Err(TransportError::retryable(name, "connection reset")),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConversionStrategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn convert(&self, _url: &DocumentUrl) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone()
        }
    }

    fn url() -> DocumentUrl {
        DocumentUrl::new("https://example.org/a.pdf").expect("non-empty")
    }

    #[tokio::test]
    async fn sufficient_primary_output_skips_secondary() {
        let primary = Fixed::ok("reader", 3000);
        let secondary = Fixed::ok("extract", 5000);
        let pipeline = ConversionPipeline::new(vec![primary.clone(), secondary.clone()], 3000);

        assert_eq!(pipeline.convert(&url()).await.len(), 3000);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn short_primary_output_invokes_secondary_once() {
        let primary = Fixed::ok("reader", 2999);
        let secondary = Fixed::ok("extract", 4000);
        let pipeline = ConversionPipeline::new(vec![primary.clone(), secondary.clone()], 3000);

        assert_eq!(pipeline.convert(&url()).await.len(), 4000);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn best_effort_returns_final_strategy_output_when_all_are_short() {
        let primary = Fixed::ok("reader", 1200);
        let secondary = Fixed::ok("extract", 800);
        let pipeline = ConversionPipeline::new(vec![primary, secondary], 3000);

        assert_eq!(pipeline.convert(&url()).await.len(), 800);
    }

    #[tokio::test]
    async fn failed_final_strategy_discards_earlier_short_output() {
        let primary = Fixed::ok("reader", 1200);
        let pipeline = ConversionPipeline::new(vec![primary, Fixed::failing("extract")], 3000);

        assert_eq!(pipeline.convert(&url()).await, "");
    }

    #[tokio::test]
    async fn failing_strategies_yield_empty_text() {
        let pipeline = ConversionPipeline::new(vec![Fixed::failing("reader"), Fixed::failing("extract")], 3000);
        assert_eq!(pipeline.convert(&url()).await, "");
        assert_eq!(ConversionPipeline::new(Vec::new(), 3000).convert(&url()).await, "");
    }
}
