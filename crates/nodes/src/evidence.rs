//! Evidence collection for one sub-question.
//!
//! Two independent branches gather evidence and are joined once, at the end:
//!
//! ```text
//!              keyword branch                         document branch
//!   generate N search keywords             ∥  generate M file keywords
//!   per keyword: search → analyze          ∥  discover URLs → per URL: convert → analyze → gate
//!   refine CompleteAnalysis                ∥  summarise accepted analyses
//! ```
//!
//! Neither branch waits on the other: a slow search never delays document
//! summarisation and vice versa. The shared `EvidenceGathering` and
//! `Refining` stages are reported by whichever branch reaches them first.
//!
//! Every per-keyword and per-document failure is contained: the keyword or
//! document contributes nothing and the branch carries on. A branch that ends
//! up with no evidence yields an empty [`RefinedAnalysis`] or the
//! "no documents found" [`DocumentSummary`] placeholder, never an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use pipeline::{
    AnalyzedPoint, CompleteAnalysis, DocumentAnalysis, DocumentSummary, DocumentUrl, Keyword,
    RefinedAnalysis, Stage,
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::progress::SubQuestionProgress;
use crate::quality::{MinLength, QualityGate};
use crate::retry::RetryExecutor;
use crate::services::ResearchServices;
use crate::tasks::{
    AnalyzeDocument, AnalyzeSearchResult, GenerateDocumentKeywords, GenerateKeywords,
    RefineAnalysis, SummarizeDocuments,
};

/// The evidence a sub-question's answer is written from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    /// Keyword-branch result.
    pub refined: RefinedAnalysis,
    /// Document-branch result.
    pub documents: DocumentSummary,
}

/// A stage both branches pass through, reported once.
struct SharedStage<'a> {
    progress: &'a SubQuestionProgress,
    stage: Stage,
    reported: AtomicBool,
}

impl<'a> SharedStage<'a> {
    fn new(progress: &'a SubQuestionProgress, stage: Stage) -> Self {
        Self {
            progress,
            stage,
            reported: AtomicBool::new(false),
        }
    }

    fn reach(&self, detail: impl FnOnce() -> String) {
        if !self.reported.swap(true, Ordering::SeqCst) {
            self.progress.enter(self.stage, detail());
        }
    }
}

/// Runs both evidence branches for one sub-question.
#[derive(Debug, Clone)]
pub struct EvidenceCollector {
    services: Arc<ResearchServices>,
}

impl EvidenceCollector {
    /// Creates a collector over `services`.
    pub fn new(services: Arc<ResearchServices>) -> Self {
        Self { services }
    }

    /// Collects and condenses evidence for `sub_question`, reporting each
    /// phase through `progress`.
    pub async fn collect(
        &self,
        query: &str,
        sub_question: &str,
        progress: &SubQuestionProgress,
    ) -> Evidence {
        progress.enter(Stage::KeywordsGenerating, "generating search keywords");
        let gathering = SharedStage::new(progress, Stage::EvidenceGathering);
        let refining = SharedStage::new(progress, Stage::Refining);

        let (refined, documents) = tokio::join!(
            self.keyword_branch(query, sub_question, &gathering, &refining),
            self.document_branch(query, sub_question, &gathering, &refining),
        );
        Evidence { refined, documents }
    }

    // -----------------------------------------------------------------------
    // Keyword branch
    // -----------------------------------------------------------------------

    async fn keyword_branch(
        &self,
        query: &str,
        sub_question: &str,
        gathering: &SharedStage<'_>,
        refining: &SharedStage<'_>,
    ) -> RefinedAnalysis {
        let keywords = self.search_keywords(query, sub_question).await;

        gathering.reach(|| format!("searching {} keywords", keywords.len()));
        let analysis = self.gather_points(query, sub_question, keywords).await;
        info!(points = analysis.len(), "keyword evidence gathered");

        refining.reach(|| "condensing evidence".to_string());
        self.refine(query, sub_question, &analysis).await
    }

    async fn search_keywords(&self, query: &str, sub_question: &str) -> Vec<Keyword> {
        let count = self.services.settings.keyword_count;
        let output = self
            .services
            .generation
            .generate_or_default(&GenerateKeywords {
                query,
                sub_question,
                count,
            })
            .await;
        distinct_keywords(output.keywords, count)
    }

    async fn gather_points(
        &self,
        query: &str,
        sub_question: &str,
        keywords: Vec<Keyword>,
    ) -> CompleteAnalysis {
        let mut tasks: FuturesUnordered<_> = keywords
            .into_iter()
            .map(|keyword| {
                let span = info_span!("keyword", keyword = %keyword);
                self.analyze_keyword(query, sub_question, keyword)
                    .instrument(span)
            })
            .collect();

        let mut analysis = CompleteAnalysis::new();
        while let Some(points) = tasks.next().await {
            analysis.absorb(points);
        }
        analysis
    }

    async fn analyze_keyword(
        &self,
        query: &str,
        sub_question: &str,
        keyword: Keyword,
    ) -> Vec<AnalyzedPoint> {
        let services = &self.services;
        let gate = MinLength::non_empty("search result");
        let keyword = &keyword;
        let outcome = RetryExecutor::new(services.settings.search_attempts)
            .with_max_delay(services.settings.max_retry_delay())
            .execute_rotating(
                "search",
                &services.search_credentials,
                |lease| async move { services.search.search(keyword, lease.credential()).await },
                |text: &String| gate.accept(text.as_str()),
            )
            .await;

        let Some(raw) = outcome.into_value() else {
            warn!("no usable search result; keyword contributes nothing");
            return Vec::new();
        };

        let points: Vec<AnalyzedPoint> = services
            .generation
            .generate_or_default(&AnalyzeSearchResult {
                query,
                sub_question,
                search_result: &raw,
            })
            .await
            .points
            .into_iter()
            .map(AnalyzedPoint::from)
            .filter(|p| !p.point.trim().is_empty())
            .collect();
        debug!(points = points.len(), "search result analysed");
        points
    }

    async fn refine(
        &self,
        query: &str,
        sub_question: &str,
        analysis: &CompleteAnalysis,
    ) -> RefinedAnalysis {
        if analysis.is_empty() {
            debug!("no analysed points; skipping refinement");
            return RefinedAnalysis::default();
        }
        self.services
            .generation
            .generate_or_default(&RefineAnalysis {
                query,
                sub_question,
                analysis,
            })
            .await
            .into()
    }

    // -----------------------------------------------------------------------
    // Document branch
    // -----------------------------------------------------------------------

    async fn document_branch(
        &self,
        query: &str,
        sub_question: &str,
        gathering: &SharedStage<'_>,
        refining: &SharedStage<'_>,
    ) -> DocumentSummary {
        let keywords = self.document_keywords(sub_question).await;

        gathering.reach(|| format!("searching documents for {} keywords", keywords.len()));
        let documents = self.gather_documents(query, sub_question, &keywords).await;
        info!(documents = documents.len(), "document evidence gathered");

        refining.reach(|| "condensing evidence".to_string());
        self.summarize(query, sub_question, &documents).await
    }

    async fn document_keywords(&self, sub_question: &str) -> Vec<Keyword> {
        let count = self.services.settings.file_keyword_count;
        let output = self
            .services
            .generation
            .generate_or_default(&GenerateDocumentKeywords {
                sub_question,
                count,
            })
            .await;
        distinct_keywords(output.keywords, count)
    }

    async fn gather_documents(
        &self,
        query: &str,
        sub_question: &str,
        keywords: &[Keyword],
    ) -> Vec<DocumentAnalysis> {
        if keywords.is_empty() {
            return Vec::new();
        }

        let finder = &self.services.finder;
        let urls = match finder
            .find_documents(keywords, self.services.settings.discovery_limits())
            .await
        {
            Ok(urls) => distinct_urls(urls),
            Err(error) => {
                warn!(finder = finder.name(), %error, "document discovery failed");
                Vec::new()
            }
        };
        debug!(urls = urls.len(), "documents discovered");

        let mut tasks: FuturesUnordered<_> = urls
            .into_iter()
            .enumerate()
            .map(|(position, url)| {
                let span = info_span!("document", url = %url);
                async move { (position, self.analyze_document(query, sub_question, url).await) }
                    .instrument(span)
            })
            .collect();

        let mut accepted = Vec::new();
        while let Some((position, analysis)) = tasks.next().await {
            if let Some(analysis) = analysis {
                accepted.push((position, analysis));
            }
        }
        accepted.sort_by_key(|(position, _)| *position);
        accepted.into_iter().map(|(_, analysis)| analysis).collect()
    }

    async fn analyze_document(
        &self,
        query: &str,
        sub_question: &str,
        url: DocumentUrl,
    ) -> Option<DocumentAnalysis> {
        let text = self.services.conversion.convert(&url).await;
        if text.trim().is_empty() {
            debug!("document produced no text");
            return None;
        }

        let output = self
            .services
            .generation
            .generate_or_default(&AnalyzeDocument {
                query,
                sub_question,
                text: &text,
            })
            .await;
        let analysis = DocumentAnalysis {
            url,
            analysis: output.analysis,
        };
        MinLength::new(
            "document analysis",
            self.services.settings.min_document_analysis_chars,
        )
        .accept(&analysis)
        .then_some(analysis)
    }

    async fn summarize(
        &self,
        query: &str,
        sub_question: &str,
        analyses: &[DocumentAnalysis],
    ) -> DocumentSummary {
        if analyses.is_empty() {
            return DocumentSummary::no_documents_found();
        }
        self.services
            .generation
            .generate_or_default(&SummarizeDocuments {
                query,
                sub_question,
                analyses,
            })
            .await
            .into()
    }
}

fn distinct_keywords(raw: Vec<String>, limit: usize) -> Vec<Keyword> {
    let mut keywords: Vec<Keyword> = Vec::with_capacity(limit);
    for keyword in raw.into_iter().filter_map(Keyword::new) {
        if keywords.len() == limit {
            break;
        }
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords
}

fn distinct_urls(urls: Vec<DocumentUrl>) -> Vec<DocumentUrl> {
    let mut seen = Vec::with_capacity(urls.len());
    for url in urls {
        if !seen.contains(&url) {
            seen.push(url);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use pipeline::{JobId, ProgressSink, ProgressUpdate, SubQuestionIndex};

    use super::*;
    use crate::progress::ProgressTracker;

    #[derive(Default)]
    struct Recording(Mutex<Vec<ProgressUpdate>>);

    impl ProgressSink for Recording {
        fn report(&self, update: ProgressUpdate) {
            self.0.lock().push(update);
        }
    }

    #[test]
    fn shared_stage_is_reported_by_the_first_branch_only() {
        let sink = Arc::new(Recording::default());
        let tracker = ProgressTracker::new(JobId::new_random(), sink.clone());
        let progress = tracker.sub_question(SubQuestionIndex::new(0));
        let refining = SharedStage::new(&progress, Stage::Refining);

        refining.reach(|| "document branch".to_string());
        refining.reach(|| panic!("second branch must not report"));

        let updates = sink.0.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].progress.stage, Stage::Refining);
        assert!(updates[0].progress.detail.ends_with("document branch"));
    }

    #[test]
    fn keywords_are_trimmed_deduplicated_and_capped() {
        let raw = vec![
            " ev sales india ".to_string(),
            "".to_string(),
            "ev sales india".to_string(),
            "charging network".to_string(),
            "battery costs".to_string(),
        ];
        let keywords = distinct_keywords(raw, 2);
        let texts: Vec<&str> = keywords.iter().map(Keyword::as_str).collect();
        assert_eq!(texts, vec!["ev sales india", "charging network"]);
    }

    #[test]
    fn duplicate_urls_are_analysed_once() {
        let url = |s: &str| DocumentUrl::new(s).expect("non-empty");
        let urls = distinct_urls(vec![url("https://a/1.pdf"), url("https://b/2.pdf"), url("https://a/1.pdf")]);
        assert_eq!(urls, vec![url("https://a/1.pdf"), url("https://b/2.pdf")]);
    }
}
