//! Progress events emitted while a research run executes.
//!
//! The coordinator never renders anything itself; front-ends subscribe to the
//! receiving half of the channel and decide how to display progress.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Unique identifier for an event
pub type EventId = String;

/// Phase of a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    QueryExpansion,
    WebSearch,
    Summarize,
    Synthesis,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::QueryExpansion => "query_expansion",
            Phase::WebSearch => "web_search",
            Phase::Summarize => "summarize",
            Phase::Synthesis => "synthesis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    PhaseStarted {
        phase: Phase,
    },
    QueriesGenerated {
        thoughts: String,
        queries: Vec<String>,
    },
    SearchCompleted {
        query: String,
        hits: usize,
    },
    SearchFailed {
        query: String,
        error: String,
    },
    AnalyzingResult {
        query: String,
        title: String,
        url: String,
    },
    ResultSummarized {
        title: String,
        summary_preview: String,
        elapsed_ms: u64,
    },
    ResearchRunComplete {
        sources: usize,
        queries: usize,
    },
    ReportReady {
        chars: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchEvent {
    pub event_id: EventId,
    pub timestamp: u64,
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Sending half of the event channel; cheap to clone into every task.
#[derive(Clone)]
pub struct EventCollector {
    sender: Option<mpsc::UnboundedSender<ResearchEvent>>,
}

impl EventCollector {
    /// Create a new event collector
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResearchEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Collector that drops every event.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, run_id: &str, kind: EventKind) {
        let Some(sender) = &self.sender else {
            return;
        };

        let event = ResearchEvent {
            event_id: generate_event_id(),
            timestamp: current_timestamp(),
            run_id: run_id.to_string(),
            kind,
        };

        if let Err(e) = sender.send(event) {
            tracing::debug!(error = %e, "event receiver dropped");
        }
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Generate a unique event ID
fn generate_event_id() -> EventId {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("evt_{}", id)
}

/// Get current Unix timestamp in milliseconds
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
