use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use researchflow_core::{
    ConfigLoader, DuckDuckGoSearch, EventCollector, EventKind, OpenAiChatRunner, Phase,
    ResearchCoordinator, ResearchEvent, RunLogInput, TelemetryOptions, init_metrics_from_env,
    init_telemetry, log_run_completion, persist_trace,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "researchflow",
    version,
    about = "Expand a question, search the web, summarize and synthesize a report"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research session for a query.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Question to research.
    #[arg(long)]
    query: String,

    /// Configuration file (defaults to `researchflow.toml` or `RESEARCHFLOW_CONFIG`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of search hits kept per sub-query.
    #[arg(long)]
    max_results: Option<usize>,

    /// Override the search region (e.g. `us-en`, `de-de`).
    #[arg(long)]
    region: Option<String>,

    /// Directory to write the run trace JSON into.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Append the completed run to the JSONL run log.
    #[arg(long, default_value_t = false)]
    log_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(args).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let mut config = ConfigLoader::load(args.config.clone())?;
    init_telemetry(TelemetryOptions::default().with_level(&config.logging.level))?;
    init_metrics_from_env("researchflow-cli");

    if let Some(max_results) = args.max_results {
        anyhow::ensure!(max_results > 0, "--max-results must be at least 1");
        config.search.max_results = max_results;
    }
    if let Some(region) = args.region {
        config.search.region = region;
    }

    let api_key = config.llm_api_key()?;
    let runner = OpenAiChatRunner::from_config(&config.llm, api_key)?;
    let search = DuckDuckGoSearch::new(
        &config.search.endpoint,
        Duration::from_secs(config.search.timeout_secs),
    )?;

    let (events, receiver) = EventCollector::new();
    let renderer = tokio::spawn(render_events(receiver));

    let mut coordinator =
        ResearchCoordinator::new(args.query.clone(), Arc::new(runner), Arc::new(search))
            .with_search_options(config.search.options())
            .with_events(events);

    info!(query = %args.query, run_id = %coordinator.run_id(), "starting research run");
    let outcome = coordinator.research().await;

    let run_id = coordinator.run_id().to_string();
    let trace_events = coordinator.trace().events().to_vec();
    let trace_summary = (!coordinator.trace().is_empty())
        .then(|| coordinator.trace().summary().render_markdown());
    let sub_queries = coordinator
        .query_response()
        .map(|response| response.queries.clone())
        .unwrap_or_default();
    let sources: Vec<String> = coordinator
        .search_results()
        .iter()
        .map(|result| result.url.clone())
        .collect();
    drop(coordinator);
    renderer.await.context("event renderer panicked")?;

    let trace_path = match args.trace_dir.or(config.trace.dir.clone()) {
        Some(dir) => match persist_trace(&dir, &run_id, &trace_events) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "failed to persist trace");
                None
            }
        },
        None => None,
    };

    let report = outcome?;

    println!("\n {}\n", "Research complete!".bold().green());
    println!("{report}");

    if let Some(summary) = &trace_summary {
        println!("\n{summary}");
    }
    if let Some(path) = &trace_path {
        println!("{} {}", "Trace:".dimmed(), path.display());
    }

    if args.log_run || config.logging.persist_runs {
        let input = RunLogInput {
            run_id,
            query: args.query,
            sub_queries,
            report,
            sources,
            trace_path: trace_path.map(|path| path.display().to_string()),
        };
        match log_run_completion(input) {
            Ok(path) => info!(path = %path.display(), "run logged"),
            Err(err) => warn!(error = %err, "failed to write run log"),
        }
    }

    Ok(())
}

async fn render_events(mut receiver: UnboundedReceiver<ResearchEvent>) {
    let mut console = ConsoleRenderer::default();
    let mut stdout = std::io::stdout();
    while let Some(event) = receiver.recv().await {
        if let Err(err) = console.render(&event.kind, &mut stdout) {
            warn!(error = %err, "failed to render progress event");
        }
    }
}

/// Prints progress events; groups each sub-query's results under one header.
#[derive(Default)]
struct ConsoleRenderer {
    current_query: Option<String>,
}

impl ConsoleRenderer {
    fn render(&mut self, kind: &EventKind, out: &mut impl Write) -> std::io::Result<()> {
        match kind {
            EventKind::PhaseStarted { phase } => match phase {
                Phase::QueryExpansion => writeln!(out, "{}", "Analyzing query...".bold().cyan())?,
                Phase::Synthesis => {
                    writeln!(out, "{}", "Synthesizing research findings...".bold().cyan())?
                }
                Phase::WebSearch | Phase::Summarize => {}
            },
            EventKind::QueriesGenerated { thoughts, queries } => {
                writeln!(out, "\n{}", "== Query Analysis ==".bold().cyan())?;
                writeln!(out, "{} {thoughts}", "Thoughts:".yellow())?;
                writeln!(out, "\n{}", "Generated Search Queries:".yellow())?;
                for (idx, query) in queries.iter().enumerate() {
                    writeln!(out, " {}. {query}", idx + 1)?;
                }
            }
            EventKind::SearchCompleted { .. } => {}
            EventKind::SearchFailed { query, error } => {
                writeln!(out, "{} {query}: {error}", "Search error:".bold().red())?;
            }
            EventKind::AnalyzingResult { query, title, url } => {
                if self.current_query.as_deref() != Some(query.as_str()) {
                    writeln!(out, "\n{} {query}", "Searching for:".bold().cyan())?;
                    self.current_query = Some(query.clone());
                }
                writeln!(out, "   {} {title}", "Result:".green())?;
                writeln!(out, "   {} {url}", "URL:".dimmed())?;
                writeln!(out, "   {}", "Analyzing content...".cyan())?;
            }
            EventKind::ResultSummarized {
                summary_preview,
                elapsed_ms,
                ..
            } => {
                writeln!(out, "   {} {summary_preview}", "Summary:".green())?;
                let elapsed = format!("Analysis completed in {:.2}s", *elapsed_ms as f64 / 1000.0);
                writeln!(out, "   {}\n", elapsed.dimmed())?;
            }
            EventKind::ResearchRunComplete { sources, queries } => {
                writeln!(
                    out,
                    "\n{} Found {sources} sources across {queries} queries.",
                    "Research run complete".bold().green()
                )?;
            }
            EventKind::ReportReady { .. } => {}
        }
        Ok(())
    }
}
