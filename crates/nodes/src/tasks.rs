//! Structured generation tasks.
//!
//! Each task names the generation step it performs, carries its input, builds
//! its prompts, and declares the typed output the model must produce. The
//! output type doubles as the JSON Schema sent with the request, so the schema
//! and the parser can never drift apart.
//!
//! Every output type implements [`Default`]: the default is the
//! empty-but-valid value substituted when generation cannot be recovered.

use pipeline::{
    AnalyzedPoint, CompleteAnalysis, DocumentAnalysis, DocumentSummary, GenerationRequest,
    ModelTier, RefinedAnalysis, ReferenceList, SubQuestionOutcome,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// A single schema-constrained generation step.
pub trait StructuredTask: Send + Sync {
    /// Typed output; also the source of the request's JSON Schema.
    type Output: DeserializeOwned + JsonSchema + Default + Send;

    /// Stable task name used as the schema name and in logs.
    const NAME: &'static str;

    /// Instructions for the model.
    fn system_prompt(&self) -> String;

    /// The task input rendered for the model.
    fn user_prompt(&self) -> String;

    /// Builds the provider-agnostic request for this task.
    fn request(&self) -> GenerationRequest {
        GenerationRequest {
            task: Self::NAME,
            system_prompt: self.system_prompt(),
            user_prompt: self.user_prompt(),
            schema: output_schema::<Self::Output>(),
            tier: ModelTier::Primary,
        }
    }
}

/// JSON Schema for a task output type.
pub fn output_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Sub-questions and output-shape notes extracted from the research query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct SubQuestionPlan {
    /// The sub-questions, most fundamental first.
    pub questions: Vec<String>,
    /// Notes on any output format the user asked for; empty if none.
    pub format_notes: String,
}

/// A list of search keywords.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct KeywordSet {
    /// Search keywords, one query string each.
    pub keywords: Vec<String>,
}

/// A condensed point with its source, as produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct PointOutput {
    /// The condensed fact.
    pub point: String,
    /// The source of the fact (usually a URL).
    pub reference: String,
}

impl From<PointOutput> for AnalyzedPoint {
    fn from(p: PointOutput) -> Self {
        AnalyzedPoint {
            point: p.point,
            reference: p.reference,
        }
    }
}

/// Points extracted from one search result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct SearchPoints {
    /// Condensed points with references.
    pub points: Vec<PointOutput>,
}

/// Refined prose over a set of analysed points.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct Refinement {
    /// Refined prose with inline `[^n^]` citations.
    pub refined_analysis: String,
    /// References in citation order.
    pub references: Vec<String>,
}

impl From<Refinement> for RefinedAnalysis {
    fn from(r: Refinement) -> Self {
        RefinedAnalysis::new(r.refined_analysis, r.references)
    }
}

/// Analysis of a single document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct DocumentAnalysisOutput {
    /// The analysis text.
    pub analysis: String,
}

/// Condensed summary over several document analyses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct DocumentSummaryOutput {
    /// Summary prose.
    pub summary: String,
    /// URLs of the documents the summary draws on.
    pub references: Vec<String>,
}

impl From<DocumentSummaryOutput> for DocumentSummary {
    fn from(s: DocumentSummaryOutput) -> Self {
        DocumentSummary::new(s.summary, s.references)
    }
}

/// A cited answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct CitedAnswer {
    /// Answer prose with inline `[^n^]` citations.
    pub answer: String,
    /// References in citation order.
    pub references: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

const CITATION_RULES: &str = "Cite every fact inline with markers of the form [^1^], [^2^], \
numbered by position in the references list you return. Each reference must be a source URL \
or, when no URL is available, a short source description. Do not list a reference twice.";

/// Breaks a research query into sub-questions.
#[derive(Debug, Clone)]
pub struct DecomposeQuery<'a> {
    /// The research query.
    pub query: &'a str,
}

impl StructuredTask for DecomposeQuery<'_> {
    type Output = SubQuestionPlan;
    const NAME: &'static str = "decompose_query";

    fn system_prompt(&self) -> String {
        "You are a research planner. Break the user's query into at most five focused \
         sub-questions that together cover it in depth (history, current state, outlook, \
         economics, technology, policy, as relevant). Keep any sub-questions the user \
         asked explicitly, made more specific. If the user asks for a particular output \
         format or structure, describe it in format_notes; otherwise leave format_notes empty."
            .to_string()
    }

    fn user_prompt(&self) -> String {
        format!("Research query: {}", self.query)
    }
}

/// Generates web-search keywords for one sub-question.
#[derive(Debug, Clone)]
pub struct GenerateKeywords<'a> {
    /// The research query, for context.
    pub query: &'a str,
    /// The sub-question the keywords should serve.
    pub sub_question: &'a str,
    /// Number of keywords wanted.
    pub count: usize,
}

impl StructuredTask for GenerateKeywords<'_> {
    type Output = KeywordSet;
    const NAME: &'static str = "generate_keywords";

    fn system_prompt(&self) -> String {
        format!(
            "You are a web search specialist. Produce {} distinct search queries that \
             gather detailed evidence for the sub-question. Focus on the sub-question; \
             use the main query only as context, with at most one query bridging the two. \
             Mix broad and specific queries covering facts, figures, expert views, and \
             recent developments.",
            self.count
        )
    }

    fn user_prompt(&self) -> String {
        format!(
            "Main query (context): {}\nSub-question (focus): {}",
            self.query, self.sub_question
        )
    }
}

/// Generates document-oriented search keywords for one sub-question.
#[derive(Debug, Clone)]
pub struct GenerateDocumentKeywords<'a> {
    /// The sub-question the documents should serve.
    pub sub_question: &'a str,
    /// Number of keywords wanted.
    pub count: usize,
}

impl StructuredTask for GenerateDocumentKeywords<'_> {
    type Output = KeywordSet;
    const NAME: &'static str = "generate_document_keywords";

    fn system_prompt(&self) -> String {
        format!(
            "You search for in-depth PDF documents: industry reports, market analyses, \
             company presentations, and research papers. Produce {} distinct search \
             queries. Every query must contain filetype:pdf. Prefer recent years and \
             authoritative sources; use operators such as site:, intitle:, or inurl: \
             where they help. Do not wrap queries in quotation marks.",
            self.count
        )
    }

    fn user_prompt(&self) -> String {
        format!("Topic: {}", self.sub_question)
    }
}

/// Extracts condensed, referenced points from a raw search result.
#[derive(Debug, Clone)]
pub struct AnalyzeSearchResult<'a> {
    /// The research query, for context.
    pub query: &'a str,
    /// The sub-question being researched.
    pub sub_question: &'a str,
    /// Raw result text from the search provider.
    pub search_result: &'a str,
}

impl StructuredTask for AnalyzeSearchResult<'_> {
    type Output = SearchPoints;
    const NAME: &'static str = "analyze_search_result";

    fn system_prompt(&self) -> String {
        "You are a research analyst. Extract every piece of information in the search \
         results that bears on the sub-question or the main query. Condense each into a \
         clear point and give the source it came from as its reference. You may draw \
         inferences, but label them and explain the reasoning; never invent facts."
            .to_string()
    }

    fn user_prompt(&self) -> String {
        format!(
            "Main query: {}\nSub-question: {}\nSearch results:\n{}",
            self.query, self.sub_question, self.search_result
        )
    }
}

/// Condenses every analysed point for a sub-question into cited prose.
#[derive(Debug, Clone)]
pub struct RefineAnalysis<'a> {
    /// The research query, for context.
    pub query: &'a str,
    /// The sub-question being researched.
    pub sub_question: &'a str,
    /// All points gathered by the keyword branch.
    pub analysis: &'a CompleteAnalysis,
}

impl StructuredTask for RefineAnalysis<'_> {
    type Output = Refinement;
    const NAME: &'static str = "refine_analysis";

    fn system_prompt(&self) -> String {
        format!(
            "You synthesise research notes into a detailed, well-organised analysis of the \
             sub-question, using headings where they help. Remove exact duplicates, keep \
             every relevant figure and trend, and point out conflicting information. \
             {CITATION_RULES}"
        )
    }

    fn user_prompt(&self) -> String {
        let points = self
            .analysis
            .points()
            .iter()
            .map(|p| format!("Point: {}\nReference: {}", p.point, p.reference))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "Main query: {}\nSub-question: {}\nPoints:\n{}",
            self.query, self.sub_question, points
        )
    }
}

/// Analyses the text of one downloaded document.
#[derive(Debug, Clone)]
pub struct AnalyzeDocument<'a> {
    /// The research query, for context.
    pub query: &'a str,
    /// The sub-question being researched.
    pub sub_question: &'a str,
    /// Converted document text.
    pub text: &'a str,
}

impl StructuredTask for AnalyzeDocument<'_> {
    type Output = DocumentAnalysisOutput;
    const NAME: &'static str = "analyze_document";

    fn system_prompt(&self) -> String {
        "You analyse documents for a research project. Write an exhaustive, point-by-point \
         analysis of the text as it bears on the sub-question, including any data that \
         answers the main query directly. Include specific figures and quotes with their \
         context, examine conflicting statements, and clearly label any extrapolation."
            .to_string()
    }

    fn user_prompt(&self) -> String {
        format!(
            "Main query: {}\nSub-question: {}\nDocument text:\n{}",
            self.query, self.sub_question, self.text
        )
    }
}

/// Condenses the accepted document analyses for a sub-question.
#[derive(Debug, Clone)]
pub struct SummarizeDocuments<'a> {
    /// The research query, for context.
    pub query: &'a str,
    /// The sub-question being researched.
    pub sub_question: &'a str,
    /// Analyses that passed the quality gate.
    pub analyses: &'a [DocumentAnalysis],
}

impl StructuredTask for SummarizeDocuments<'_> {
    type Output = DocumentSummaryOutput;
    const NAME: &'static str = "summarize_documents";

    fn system_prompt(&self) -> String {
        "You condense analyses of several documents into one summary focused on the \
         sub-question, keeping key details about the main query. Organise it into distinct \
         points, keep specific figures exactly as stated, and note conflicts. Each analysis \
         is introduced by its document URL; list the URLs you draw on as references."
            .to_string()
    }

    fn user_prompt(&self) -> String {
        let analyses = self
            .analyses
            .iter()
            .map(|a| format!("Analysis of {}:\n{}", a.url, a.analysis))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "Main query: {}\nSub-question: {}\nAnalyses:\n{}",
            self.query, self.sub_question, analyses
        )
    }
}

/// Combines both evidence branches into a cited answer for one sub-question.
#[derive(Debug, Clone)]
pub struct AnswerSubQuestion<'a> {
    /// The sub-question to answer.
    pub sub_question: &'a str,
    /// Keyword-branch evidence.
    pub refined: &'a RefinedAnalysis,
    /// Document-branch evidence.
    pub documents: &'a DocumentSummary,
}

impl StructuredTask for AnswerSubQuestion<'_> {
    type Output = CitedAnswer;
    const NAME: &'static str = "answer_sub_question";

    fn system_prompt(&self) -> String {
        format!(
            "You answer a research sub-question from two bodies of evidence: a web search \
             analysis and a document analysis. Combine them into a thorough answer made of \
             distinct, well-developed points with every relevant figure, and note \
             conflicting information. {CITATION_RULES}"
        )
    }

    fn user_prompt(&self) -> String {
        format!(
            "Question: {}\n\nWeb search analysis:\n{}\nReferences: {}\n\nDocument analysis:\n{}\nReferences: {}",
            self.sub_question,
            self.refined.analysis,
            self.refined.references().join(", "),
            self.documents.summary,
            self.documents.references().join(", "),
        )
    }
}

/// Synthesises every sub-question's evidence into the final answer.
#[derive(Debug, Clone)]
pub struct SynthesizeFinal<'a> {
    /// The research query.
    pub query: &'a str,
    /// Output-shape notes from decomposition.
    pub format_notes: &'a str,
    /// Sub-question outcomes in decomposition order.
    pub outcomes: &'a [SubQuestionOutcome],
    /// Every reference across all outcomes, numbered.
    pub references: &'a ReferenceList,
}

impl StructuredTask for SynthesizeFinal<'_> {
    type Output = CitedAnswer;
    const NAME: &'static str = "synthesize_final";

    fn system_prompt(&self) -> String {
        format!(
            "You write the final answer to a research query from per-sub-question analyses. \
             Answer the query directly and in depth, organised with headings, keeping all \
             relevant figures and presenting conflicting information fairly. Follow the \
             format notes if any are given. Prefer the numbering of the consolidated \
             reference list you are given. {CITATION_RULES}"
        )
    }

    fn user_prompt(&self) -> String {
        let sections = self
            .outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| {
                format!(
                    "Sub-question {}: {}\nWeb search analysis:\n{}\nReferences: {}\nDocument analysis:\n{}\nReferences: {}",
                    i + 1,
                    o.sub_question.question,
                    o.refined.analysis,
                    o.refined.references().join(", "),
                    o.documents.summary,
                    o.documents.references().join(", "),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let notes = if self.format_notes.trim().is_empty() {
            "(none)"
        } else {
            self.format_notes
        };
        format!(
            "Main query: {}\nFormat notes: {}\n\n{}\n\nConsolidated references:\n{}",
            self.query,
            notes,
            sections,
            self.references.render_numbered()
        )
    }
}

// ---------------------------------------------------------------------------
// Reformat recovery
// ---------------------------------------------------------------------------

/// Name under which reformat requests are issued.
pub const REFORMAT_TASK: &str = "reformat_output";

/// Builds the narrow recovery request that restructures malformed output of
/// task `failed_task` to match `schema`, without changing its content.
pub fn reformat_request(failed_task: &str, schema: Value, raw: &str) -> GenerationRequest {
    GenerationRequest {
        task: REFORMAT_TASK,
        system_prompt: "You repair malformed JSON. Rewrite the input so that it is valid JSON \
                        matching the given schema. Do not add, remove, or reword any \
                        information; only fix the structure."
            .to_string(),
        user_prompt: format!(
            "The following output of the '{failed_task}' step could not be parsed.\n\nSchema:\n{schema}\n\nOutput:\n{raw}"
        ),
        schema,
        tier: ModelTier::Reformat,
    }
}
