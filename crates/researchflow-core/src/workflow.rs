//! The research coordinator: one instance per research run.
//!
//! A run is a fixed, linear `graph_flow` graph:
//! `query_expansion → web_search → summarize → synthesis`.

use std::sync::Arc;

use graph_flow::{
    ExecutionStatus, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session,
    SessionStorage, Task,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::agents::{AgentRunner, AgentSet};
use crate::error::from_graph_error;
use crate::events::EventCollector;
use crate::models::{QueryResponse, SearchResult};
use crate::search::{SearchOptions, SearchProvider};
use crate::tasks::{keys, QueryExpansionTask, SummarizeTask, SynthesisTask, WebSearchTask};
use crate::trace::{TraceCollector, TraceEvent, WORKFLOW_TRACE_NAME};
use crate::ResearchError;

struct WorkflowTasks {
    expand: Arc<QueryExpansionTask>,
    search: Arc<WebSearchTask>,
    summarize: Arc<SummarizeTask>,
    synthesis: Arc<SynthesisTask>,
}

fn build_graph(tasks: &WorkflowTasks) -> Arc<Graph> {
    let builder = GraphBuilder::new("deep_research_workflow")
        .add_task(tasks.expand.clone())
        .add_task(tasks.search.clone())
        .add_task(tasks.summarize.clone())
        .add_task(tasks.synthesis.clone())
        .add_edge(tasks.expand.id(), tasks.search.id())
        .add_edge(tasks.search.id(), tasks.summarize.id())
        .add_edge(tasks.summarize.id(), tasks.synthesis.id())
        .set_start_task(tasks.expand.id());

    Arc::new(builder.build())
}

fn new_run_id() -> String {
    format!("research-{}", Uuid::new_v4())
}

/// Drives a single research run and keeps its findings.
pub struct ResearchCoordinator {
    query: String,
    search_results: Vec<SearchResult>,
    query_response: Option<QueryResponse>,
    trace: TraceCollector,
    run_id: String,
    runner: Arc<dyn AgentRunner>,
    search: Arc<dyn SearchProvider>,
    search_options: SearchOptions,
    agents: AgentSet,
    events: EventCollector,
    completed: bool,
}

impl ResearchCoordinator {
    pub fn new(
        query: impl Into<String>,
        runner: Arc<dyn AgentRunner>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            query: query.into(),
            search_results: Vec::new(),
            query_response: None,
            trace: TraceCollector::new(),
            run_id: new_run_id(),
            runner,
            search,
            search_options: SearchOptions::default(),
            agents: AgentSet::default(),
            events: EventCollector::disabled(),
            completed: false,
        }
    }

    pub fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = options;
        self
    }

    pub fn with_agents(mut self, agents: AgentSet) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_events(mut self, events: EventCollector) -> Self {
        self.events = events;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Findings in sub-query order, then hit order.
    pub fn search_results(&self) -> &[SearchResult] {
        &self.search_results
    }

    pub fn query_response(&self) -> Option<&QueryResponse> {
        self.query_response.as_ref()
    }

    pub fn trace(&self) -> &TraceCollector {
        &self.trace
    }

    fn tasks(&self) -> WorkflowTasks {
        WorkflowTasks {
            expand: Arc::new(QueryExpansionTask::new(
                &self.run_id,
                self.runner.clone(),
                self.agents.query.clone(),
                self.events.clone(),
            )),
            search: Arc::new(WebSearchTask::new(
                &self.run_id,
                self.search.clone(),
                self.search_options.clone(),
                self.events.clone(),
            )),
            summarize: Arc::new(SummarizeTask::new(
                &self.run_id,
                self.runner.clone(),
                self.agents.search.clone(),
                self.events.clone(),
            )),
            synthesis: Arc::new(SynthesisTask::new(
                &self.run_id,
                self.runner.clone(),
                self.agents.synthesis.clone(),
                self.events.clone(),
            )),
        }
    }

    /// Run expansion, search, summarization and synthesis; returns the report.
    pub async fn research(&mut self) -> Result<String, ResearchError> {
        if self.completed {
            return Err(ResearchError::AlreadyCompleted);
        }
        self.completed = true;

        let span = info_span!("research", trace = WORKFLOW_TRACE_NAME, run_id = %self.run_id);
        self.execute().instrument(span).await
    }

    async fn execute(&mut self) -> Result<String, ResearchError> {
        info!(query = %self.query, "starting research run");

        let tasks = self.tasks();
        let graph = build_graph(&tasks);
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(graph, storage.clone());

        let session = Session::new_from_task(self.run_id.clone(), tasks.expand.id());
        session.context.set(keys::QUERY, self.query.clone()).await;

        storage
            .save(session)
            .await
            .map_err(|err| ResearchError::Workflow(format!("failed to persist session: {err}")))?;

        let outcome = loop {
            let result = match runner.run(&self.run_id).await {
                Ok(result) => result,
                Err(err) => break Err(from_graph_error(err)),
            };

            match result.status {
                ExecutionStatus::Completed => break Ok(()),
                ExecutionStatus::WaitingForInput => continue,
                ExecutionStatus::Error(message) => break Err(ResearchError::Workflow(message)),
            }
        };

        let session = storage
            .get(&self.run_id)
            .await
            .map_err(|err| ResearchError::Workflow(format!("failed to reload session: {err}")))?
            .ok_or_else(|| ResearchError::Workflow("session missing after execution".into()))?;

        // Keep whatever the run produced, even when a later phase failed.
        let events: Vec<TraceEvent> = session.context.get(keys::TRACE).await.unwrap_or_default();
        self.trace = TraceCollector::from_events(events);
        if let Some(queries) = session.context.get::<Vec<String>>(keys::QUERIES).await {
            let thoughts: String = session.context.get(keys::THOUGHTS).await.unwrap_or_default();
            self.query_response = Some(QueryResponse { thoughts, queries });
        }
        let findings: Vec<SearchResult> =
            session.context.get(keys::FINDINGS).await.unwrap_or_default();
        self.search_results.extend(findings);

        outcome?;

        let report: String = session
            .context
            .get(keys::REPORT)
            .await
            .ok_or_else(|| ResearchError::Workflow("no report recorded".into()))?;

        info!(
            findings = self.search_results.len(),
            "research run complete"
        );
        Ok(report)
    }
}
