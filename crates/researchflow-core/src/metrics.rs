use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct PipelineMetrics {
    agent_calls: Counter<u64>,
    agent_duration_ms: Histogram<f64>,
    search_calls: Counter<u64>,
    search_failures: Counter<u64>,
}

static METRICS: OnceCell<PipelineMetrics> = OnceCell::new();

fn handles() -> &'static PipelineMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("researchflow.pipeline");
        PipelineMetrics {
            agent_calls: meter
                .u64_counter("agent_calls_total")
                .with_description("Agent invocations by agent and status")
                .init(),
            agent_duration_ms: meter
                .f64_histogram("agent_duration_ms")
                .with_description("Agent invocation latency in milliseconds")
                .init(),
            search_calls: meter
                .u64_counter("search_calls_total")
                .with_description("Search provider calls by status")
                .init(),
            search_failures: meter
                .u64_counter("search_failures_total")
                .with_description("Search calls replaced by an empty result set")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("RESEARCHFLOW_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "RESEARCHFLOW_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export pipeline metrics."
        );
    }
}

/// Record one agent invocation (no-op if no provider installed).
pub fn record_agent_call(agent: &str, status: &str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("agent", agent.to_string()),
        KeyValue::new("status", status.to_string()),
    ];

    metrics.agent_calls.add(1, &attrs);
    metrics.agent_duration_ms.record(duration_ms as f64, &attrs);
}

/// Record one search call and whether it fell back to an empty result set.
pub fn record_search_call(status: &str, hits: usize) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("status", status.to_string()),
        KeyValue::new("hits", hits as i64),
    ];

    metrics.search_calls.add(1, &attrs);
    if status != "ok" {
        metrics.search_failures.add(1, &attrs);
    }
}
