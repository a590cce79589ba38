//! Quarry CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `quarry.toml` (or `--config`), read `.env`,
//!    and resolve every API key from the environment.
//! 2. **Wire observability**: install `tracing-subscriber` with an
//!    `EnvFilter`, a pretty or JSON formatter, and an optional OpenTelemetry
//!    OTLP exporter. All spans emitted by every crate flow through it.
//! 3. **Construct infrastructure**: build the generator, search, discovery and
//!    conversion adapters and inject them into [`ResearchServices`].
//! 4. **Select mode**:
//!    - `run` researches one query in the foreground and prints the answer.
//!    - `serve` runs the job API until interrupted.

mod config;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use llm::{OpenAiCompatibleGenerator, OpenAiConfig};
use nodes::{ChannelProgressSink, InMemoryJobStore, ResearchOrchestrator, ResearchServices};
use pipeline::{ConversionStrategy, Job, JobStatus, JobStore};
use providers::{
    build_client, DownloadExtractStrategy, GoogleDocumentFinder, ReaderServiceStrategy,
    TavilySearch,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{AppConfig, Secrets};

/// Quarry: multi-source research with cited answers.
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./quarry.toml when present)
    #[arg(long, global = true, env = "QUARRY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research one query and print the cited answer
    Run {
        /// The research query
        query: String,

        /// Also write the full job record as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the job API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    let telemetry = telemetry::init(&config.telemetry)?;

    let result = execute(cli.command, &config).await;
    telemetry.shutdown();
    result
}

async fn execute(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let secrets = config.resolve_secrets(|var| std::env::var(var).ok())?;
    let services = Arc::new(build_services(config, secrets)?);

    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let (sink, writer) = ChannelProgressSink::spawn(store.clone());
    let orchestrator = ResearchOrchestrator::new(services, store, Arc::new(sink));

    match command {
        Command::Run { query, output } => run(orchestrator, writer, &query, output).await,
        Command::Serve { bind } => {
            let addr = bind.unwrap_or(config.server.bind);
            api::serve(addr, api::AppState::new(orchestrator), shutdown_signal())
                .await
                .with_context(|| format!("job API on {addr} failed"))
        }
    }
}

async fn run(
    orchestrator: ResearchOrchestrator,
    writer: JoinHandle<()>,
    query: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let job = orchestrator.research(query).await?;
    // Dropping the last sink handle lets the progress writer drain and exit.
    drop(orchestrator);
    let _ = writer.await;

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&job)?;
        std::fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
        info!(path = %path.display(), "job record written");
    }

    match job.status {
        JobStatus::Completed => {
            print!("{}", render_answer(&job));
            Ok(())
        }
        _ => anyhow::bail!(
            "research failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn render_answer(job: &Job) -> String {
    let Some(answer) = &job.answer else {
        return String::new();
    };
    let mut out = format!("{}\n", answer.answer.trim());
    if !answer.references.is_empty() {
        out.push_str("\nReferences:\n");
        for (i, reference) in answer.references.iter().enumerate() {
            out.push_str(&format!("[{}] {reference}\n", i + 1));
        }
    }
    out
}

fn build_services(config: &AppConfig, secrets: Secrets) -> anyhow::Result<ResearchServices> {
    let generator = OpenAiCompatibleGenerator::new(OpenAiConfig {
        base_url: config.llm.base_url.clone(),
        model: config.llm.model.clone(),
        reformat_model: config.llm.reformat_model.clone(),
        api_key: secrets.llm_api_key,
        timeout: config.llm.timeout(),
    })?;

    let client = build_client(config.conversion.timeout())?;
    let search = TavilySearch::new(client.clone(), config.search.endpoint.as_str())
        .with_max_results(config.search.max_results);
    let finder = GoogleDocumentFinder::new(
        client.clone(),
        config.documents.endpoint.as_str(),
        secrets.documents_api_key,
        secrets.documents_engine_id,
    );

    let mut strategies: Vec<Arc<dyn ConversionStrategy>> = Vec::new();
    if config.reader.enabled {
        strategies.push(Arc::new(ReaderServiceStrategy::new(
            client.clone(),
            config.reader.endpoint.as_str(),
            secrets.reader_api_key,
        )));
    }
    let mut extract = DownloadExtractStrategy::new(client);
    if let Some(dir) = &config.conversion.scratch_dir {
        extract = extract.with_scratch_dir(dir);
    }
    strategies.push(Arc::new(extract));

    Ok(ResearchServices::new(
        Arc::new(generator),
        Arc::new(search),
        secrets.search_keys,
        Arc::new(finder),
        strategies,
        config.research.clone(),
    )?)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
