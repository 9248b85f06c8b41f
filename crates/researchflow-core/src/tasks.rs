use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::agents::{Agent, AgentRunner};
use crate::events::{EventCollector, EventKind, Phase};
use crate::metrics::{record_agent_call, record_search_call};
use crate::models::{QueryResponse, SearchHit, SearchResult, SubQueryHits, findings_text, preview};
use crate::search::{SearchOptions, SearchProvider};
use crate::trace::TraceEvent;
use crate::ResearchError;

/// Session context keys shared by the workflow tasks.
pub(crate) mod keys {
    pub const QUERY: &str = "query";
    pub const THOUGHTS: &str = "expansion.thoughts";
    pub const QUERIES: &str = "expansion.queries";
    pub const HITS: &str = "search.hits";
    pub const FINDINGS: &str = "research.findings";
    pub const REPORT: &str = "final.report";
    pub const TRACE: &str = "trace.events";
}

const SUMMARY_PREVIEW_CHARS: usize = 100;

async fn record_trace(context: &Context, phase: Phase, message: impl Into<String>) {
    let mut events: Vec<TraceEvent> = context.get(keys::TRACE).await.unwrap_or_default();
    events.push(TraceEvent::new(phase.as_str(), message));
    context.set(keys::TRACE, &events).await;
}

async fn require<T: serde::de::DeserializeOwned>(
    context: &Context,
    key: &str,
) -> Result<T, ResearchError> {
    context
        .get(key)
        .await
        .ok_or_else(|| ResearchError::Workflow(format!("missing `{key}` in session context")))
}

/// Run an agent and record its latency, whatever the outcome.
async fn run_agent(
    runner: &dyn AgentRunner,
    agent: &Agent,
    input: &str,
) -> (Result<String, ResearchError>, u64) {
    let started = Instant::now();
    let result = runner.run(agent, input).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = if result.is_ok() { "ok" } else { "error" };
    record_agent_call(&agent.name, status, elapsed_ms);
    (result, elapsed_ms)
}

/// Expands the research question into sub-queries.
pub struct QueryExpansionTask {
    run_id: String,
    runner: Arc<dyn AgentRunner>,
    agent: Agent,
    events: EventCollector,
}

impl QueryExpansionTask {
    pub fn new(
        run_id: impl Into<String>,
        runner: Arc<dyn AgentRunner>,
        agent: Agent,
        events: EventCollector,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            runner,
            agent,
            events,
        }
    }

    pub async fn expand(&self, query: &str) -> Result<QueryResponse, ResearchError> {
        let (output, _) = run_agent(self.runner.as_ref(), &self.agent, query).await;
        let response = QueryResponse::from_agent_output(&self.agent.name, &output?)?;

        self.events.emit(
            &self.run_id,
            EventKind::QueriesGenerated {
                thoughts: response.thoughts.clone(),
                queries: response.queries.clone(),
            },
        );
        Ok(response)
    }
}

#[async_trait]
impl Task for QueryExpansionTask {
    fn id(&self) -> &str {
        Phase::QueryExpansion.as_str()
    }

    #[instrument(name = "task.query_expansion", skip(self, context), fields(run_id = %self.run_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = require(&context, keys::QUERY).await?;
        self.events.emit(
            &self.run_id,
            EventKind::PhaseStarted {
                phase: Phase::QueryExpansion,
            },
        );

        let response = self.expand(&query).await?;

        info!(
            %query,
            sub_queries = response.queries.len(),
            "query expansion produced sub-queries"
        );

        context.set(keys::THOUGHTS, &response.thoughts).await;
        context.set(keys::QUERIES, &response.queries).await;
        record_trace(
            &context,
            Phase::QueryExpansion,
            format!("generated {} sub-queries", response.queries.len()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Generated {} search queries", response.queries.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Searches every sub-query in order; failures degrade to an empty hit list.
pub struct WebSearchTask {
    run_id: String,
    search: Arc<dyn SearchProvider>,
    options: SearchOptions,
    events: EventCollector,
}

impl WebSearchTask {
    pub fn new(
        run_id: impl Into<String>,
        search: Arc<dyn SearchProvider>,
        options: SearchOptions,
        events: EventCollector,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            search,
            options,
            events,
        }
    }

    pub async fn search_one(&self, query: &str) -> Vec<SearchHit> {
        match self.search.text(query, &self.options).await {
            Ok(mut hits) => {
                hits.truncate(self.options.max_results);
                record_search_call("ok", hits.len());
                self.events.emit(
                    &self.run_id,
                    EventKind::SearchCompleted {
                        query: query.to_string(),
                        hits: hits.len(),
                    },
                );
                hits
            }
            Err(err) => {
                warn!(%query, error = %err, "search failed; continuing without results");
                record_search_call("error", 0);
                self.events.emit(
                    &self.run_id,
                    EventKind::SearchFailed {
                        query: query.to_string(),
                        error: err.to_string(),
                    },
                );
                Vec::new()
            }
        }
    }

    pub async fn search_all(&self, queries: &[String]) -> Vec<SubQueryHits> {
        let mut batches = Vec::with_capacity(queries.len());
        for query in queries {
            let hits = self.search_one(query).await;
            batches.push(SubQueryHits {
                query: query.clone(),
                hits,
            });
        }
        batches
    }
}

#[async_trait]
impl Task for WebSearchTask {
    fn id(&self) -> &str {
        Phase::WebSearch.as_str()
    }

    #[instrument(name = "task.web_search", skip(self, context), fields(run_id = %self.run_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let queries: Vec<String> = require(&context, keys::QUERIES).await?;
        self.events.emit(
            &self.run_id,
            EventKind::PhaseStarted {
                phase: Phase::WebSearch,
            },
        );

        let batches = self.search_all(&queries).await;
        let total_hits: usize = batches.iter().map(|batch| batch.hits.len()).sum();

        debug!(
            queries = queries.len(),
            total_hits, "web search pass completed"
        );

        context.set(keys::HITS, &batches).await;
        record_trace(
            &context,
            Phase::WebSearch,
            format!("{total_hits} hits across {} sub-queries", queries.len()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Collected {total_hits} search hits")),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Summarizes each hit from its title and URL.
pub struct SummarizeTask {
    run_id: String,
    runner: Arc<dyn AgentRunner>,
    agent: Agent,
    events: EventCollector,
}

impl SummarizeTask {
    pub fn new(
        run_id: impl Into<String>,
        runner: Arc<dyn AgentRunner>,
        agent: Agent,
        events: EventCollector,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            runner,
            agent,
            events,
        }
    }

    pub async fn summarize(&self, query: &str, hit: &SearchHit) -> Result<SearchResult, ResearchError> {
        self.events.emit(
            &self.run_id,
            EventKind::AnalyzingResult {
                query: query.to_string(),
                title: hit.title.clone(),
                url: hit.href.clone(),
            },
        );

        let (output, elapsed_ms) =
            run_agent(self.runner.as_ref(), &self.agent, &hit.summarization_input()).await;
        let summary = output?;

        self.events.emit(
            &self.run_id,
            EventKind::ResultSummarized {
                title: hit.title.clone(),
                summary_preview: preview(&summary, SUMMARY_PREVIEW_CHARS),
                elapsed_ms,
            },
        );

        Ok(SearchResult {
            title: hit.title.clone(),
            url: hit.href.clone(),
            summary,
        })
    }

    /// Appends one finding per hit to `findings`. On failure the findings
    /// produced before the failing hit stay in place.
    pub async fn summarize_all(
        &self,
        batches: &[SubQueryHits],
        findings: &mut Vec<SearchResult>,
    ) -> Result<(), ResearchError> {
        for batch in batches {
            for hit in &batch.hits {
                findings.push(self.summarize(&batch.query, hit).await?);
            }
        }

        self.events.emit(
            &self.run_id,
            EventKind::ResearchRunComplete {
                sources: findings.len(),
                queries: batches.len(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl Task for SummarizeTask {
    fn id(&self) -> &str {
        Phase::Summarize.as_str()
    }

    #[instrument(name = "task.summarize", skip(self, context), fields(run_id = %self.run_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let batches: Vec<SubQueryHits> = require(&context, keys::HITS).await?;
        self.events.emit(
            &self.run_id,
            EventKind::PhaseStarted {
                phase: Phase::Summarize,
            },
        );

        let mut findings = Vec::new();
        let outcome = self.summarize_all(&batches, &mut findings).await;
        context.set(keys::FINDINGS, &findings).await;
        if let Err(err) = outcome {
            warn!(kept = findings.len(), error = %err, "summarization aborted");
            return Err(err.into());
        }

        info!(findings = findings.len(), "summarized search results");

        record_trace(
            &context,
            Phase::Summarize,
            format!("summarized {} results", findings.len()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Summarized {} results", findings.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

/// Turns the accumulated findings into the final report.
pub struct SynthesisTask {
    run_id: String,
    runner: Arc<dyn AgentRunner>,
    agent: Agent,
    events: EventCollector,
}

impl SynthesisTask {
    pub fn new(
        run_id: impl Into<String>,
        runner: Arc<dyn AgentRunner>,
        agent: Agent,
        events: EventCollector,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            runner,
            agent,
            events,
        }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        findings: &[SearchResult],
    ) -> Result<String, ResearchError> {
        let input = findings_text(query, findings);
        let (output, _) = run_agent(self.runner.as_ref(), &self.agent, &input).await;
        let report = output?;

        self.events.emit(
            &self.run_id,
            EventKind::ReportReady {
                chars: report.chars().count(),
            },
        );
        Ok(report)
    }
}

#[async_trait]
impl Task for SynthesisTask {
    fn id(&self) -> &str {
        Phase::Synthesis.as_str()
    }

    #[instrument(name = "task.synthesis", skip(self, context), fields(run_id = %self.run_id))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = require(&context, keys::QUERY).await?;
        let findings: Vec<SearchResult> = require(&context, keys::FINDINGS).await?;
        self.events.emit(
            &self.run_id,
            EventKind::PhaseStarted {
                phase: Phase::Synthesis,
            },
        );

        let report = self.synthesize(&query, &findings).await?;

        info!(
            findings = findings.len(),
            report_chars = report.len(),
            "synthesis completed"
        );

        context.set(keys::REPORT, &report).await;
        record_trace(
            &context,
            Phase::Synthesis,
            format!("report synthesized from {} findings", findings.len()),
        )
        .await;

        Ok(TaskResult::new(Some(report), NextAction::End))
    }
}
