//! Scripted doubles for every port the orchestrator depends on.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodes::{InMemoryJobStore, ResearchOrchestrator, ResearchServices};
use parking_lot::Mutex;
use pipeline::{
    ConversionStrategy, Credential, DiscoveryLimits, DocumentFinder, DocumentUrl, GenerateError,
    GenerationRequest, Generator, Keyword, ProgressSink, ProgressUpdate, ResearchSettings,
    SearchProvider, TransportError,
};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

type Responder = Box<dyn Fn(&GenerationRequest) -> Result<Value, GenerateError> + Send + Sync>;

/// Generator that answers each task name with a scripted responder and
/// records every request. Unscripted tasks fail with a non-retryable error.
#[derive(Default)]
pub struct ScriptedGenerator {
    responders: HashMap<&'static str, Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        task: &'static str,
        responder: impl Fn(&GenerationRequest) -> Result<Value, GenerateError> + Send + Sync + 'static,
    ) -> Self {
        self.responders.insert(task, Box::new(responder));
        self
    }

    pub fn respond(self, task: &'static str, value: Value) -> Self {
        self.on(task, move |_| Ok(value.clone()))
    }

    pub fn calls(&self, task: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.task == task).count()
    }

    pub fn prompts(&self, task: &str) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.task == task)
            .map(|r| r.user_prompt.clone())
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerateError> {
        self.requests.lock().push(request.clone());
        match self.responders.get(request.task) {
            Some(responder) => responder(request),
            None => Err(TransportError::fatal("scripted", format!("no script for {}", request.task)).into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

type SearchFn = Box<dyn Fn(&Keyword, &Credential) -> Result<String, TransportError> + Send + Sync>;

/// Search provider backed by a closure; records `(keyword, credential)` pairs.
pub struct ScriptedSearch {
    respond: SearchFn,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedSearch {
    pub fn new(
        respond: impl Fn(&Keyword, &Credential) -> Result<String, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: Mutex::default(),
        }
    }

    /// Sleeps for `delay` before answering each search.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns one `Source:` block per keyword.
    pub fn echoing() -> Self {
        Self::new(|keyword, _| {
            Ok(format!(
                "Source: https://web.example/{}\nFindings about {}",
                keyword.as_str().replace(' ', "-"),
                keyword
            ))
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted-search"
    }

    async fn search(&self, keyword: &Keyword, credential: &Credential) -> Result<String, TransportError> {
        self.calls
            .lock()
            .push((keyword.to_string(), credential.expose().to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(keyword, credential)
    }
}

// ---------------------------------------------------------------------------
// Document discovery and conversion
// ---------------------------------------------------------------------------

type FinderFn = Box<dyn Fn(&[Keyword]) -> Vec<DocumentUrl> + Send + Sync>;

/// Document finder backed by a closure; records the limits it was given.
pub struct ScriptedFinder {
    respond: FinderFn,
    limits: Mutex<Vec<DiscoveryLimits>>,
}

impl ScriptedFinder {
    pub fn new(respond: impl Fn(&[Keyword]) -> Vec<DocumentUrl> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            limits: Mutex::default(),
        }
    }

    pub fn limits(&self) -> Vec<DiscoveryLimits> {
        self.limits.lock().clone()
    }
}

#[async_trait]
impl DocumentFinder for ScriptedFinder {
    fn name(&self) -> &str {
        "scripted-finder"
    }

    async fn find_documents(
        &self,
        keywords: &[Keyword],
        limits: DiscoveryLimits,
    ) -> Result<Vec<DocumentUrl>, TransportError> {
        self.limits.lock().push(limits);
        Ok((self.respond)(keywords))
    }
}

type ConvertFn = Box<dyn Fn(&DocumentUrl) -> Result<String, TransportError> + Send + Sync>;

/// Conversion strategy backed by a closure; counts invocations.
pub struct ScriptedStrategy {
    name: &'static str,
    respond: ConvertFn,
    calls: AtomicUsize,
}

impl ScriptedStrategy {
    pub fn new(
        name: &'static str,
        respond: impl Fn(&DocumentUrl) -> Result<String, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn convert(&self, url: &DocumentUrl) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(url)
    }
}

pub fn url(s: &str) -> DocumentUrl {
    DocumentUrl::new(s).expect("non-empty url")
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress sink that keeps every update in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn report(&self, update: ProgressUpdate) {
        self.updates.lock().push(update);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Everything a test needs to drive and inspect one orchestrator.
pub struct Harness {
    pub generator: Arc<ScriptedGenerator>,
    pub search: Arc<ScriptedSearch>,
    pub finder: Arc<ScriptedFinder>,
    pub strategies: Vec<Arc<ScriptedStrategy>>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<InMemoryJobStore>,
    pub orchestrator: ResearchOrchestrator,
}

pub fn test_settings() -> ResearchSettings {
    ResearchSettings {
        keyword_count: 2,
        file_keyword_count: 1,
        ..ResearchSettings::default()
    }
}

pub fn credentials(n: usize) -> Vec<Credential> {
    (0..n)
        .map(|i| Credential::new(format!("search-key-{i}")).expect("non-empty"))
        .collect()
}

pub fn harness(
    generator: ScriptedGenerator,
    search: ScriptedSearch,
    finder: ScriptedFinder,
    strategies: Vec<ScriptedStrategy>,
) -> Harness {
    let generator = Arc::new(generator);
    let search = Arc::new(search);
    let finder = Arc::new(finder);
    let strategies: Vec<Arc<ScriptedStrategy>> = strategies.into_iter().map(Arc::new).collect();
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(InMemoryJobStore::new());

    let services = ResearchServices::new(
        generator.clone(),
        search.clone(),
        credentials(3),
        finder.clone(),
        strategies
            .iter()
            .map(|s| s.clone() as Arc<dyn ConversionStrategy>)
            .collect(),
        test_settings(),
    )
    .expect("valid services");
    let orchestrator = ResearchOrchestrator::new(Arc::new(services), store.clone(), sink.clone());

    Harness {
        generator,
        search,
        finder,
        strategies,
        sink,
        store,
        orchestrator,
    }
}
