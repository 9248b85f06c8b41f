//! ResearchFlow core: a sequential deep-research pipeline built on `graph_flow`.
//!
//! A research run expands the user's question into sub-queries, searches the
//! web once per sub-query, summarizes every hit, and synthesizes the findings
//! into a Markdown report. Language-model and search backends sit behind the
//! [`AgentRunner`] and [`SearchProvider`] traits.

pub mod agents;
mod config;
mod error;
mod events;
mod llm;
mod logging;
mod metrics;
mod models;
mod search;
mod security;
mod tasks;
mod telemetry;
mod trace;
mod workflow;

pub use agents::{Agent, AgentRunner, AgentSet, OutputKind};
pub use config::{
    Config, ConfigLoader, LlmConfig, LoggingConfig, SearchConfig, TraceConfig,
};
pub use error::ResearchError;
pub use events::{EventCollector, EventKind, Phase, ResearchEvent};
pub use llm::OpenAiChatRunner;
pub use logging::{RunLogInput, log_run_completion};
pub use metrics::init_metrics_from_env;
pub use models::{QueryResponse, SearchHit, SearchResult, SubQueryHits, findings_text, preview};
pub use search::{
    DEFAULT_DUCKDUCKGO_ENDPOINT, DuckDuckGoSearch, SafeSearch, SearchOptions, SearchProvider,
    TimeLimit, parse_results,
};
pub use security::{SecretValue, require_env};
pub use tasks::{QueryExpansionTask, SummarizeTask, SynthesisTask, WebSearchTask};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{
    TraceCollector, TraceEvent, TraceStep, TraceSummary, WORKFLOW_TRACE_NAME, persist_trace,
};
pub use workflow::ResearchCoordinator;
