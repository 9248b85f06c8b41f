//! End-to-end behaviour of a research run against scripted collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use researchflow_core::agents::{QUERY_AGENT, SEARCH_AGENT, SYNTHESIS_AGENT};
use researchflow_core::{
    Agent, AgentRunner, EventCollector, EventKind, ResearchCoordinator, ResearchError, SearchHit,
    SearchOptions, SearchProvider,
};

/// Replays canned outputs per agent and records every call.
#[derive(Default)]
struct ScriptedRunner {
    outputs: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedRunner {
    fn respond(self, agent: &str, output: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .entry(agent.to_string())
            .or_default()
            .push_back(Ok(output.to_string()));
        self
    }

    fn fail(self, agent: &str, message: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .entry(agent.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
        self
    }

    fn calls_for(&self, agent: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == agent)
            .map(|(_, input)| input.clone())
            .collect()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(&self, agent: &Agent, input: &str) -> Result<String, ResearchError> {
        self.calls
            .lock()
            .unwrap()
            .push((agent.name.clone(), input.to_string()));

        let next = self
            .outputs
            .lock()
            .unwrap()
            .get_mut(&agent.name)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(ResearchError::agent(&agent.name, message)),
            None => Err(ResearchError::agent(&agent.name, "no scripted output left")),
        }
    }
}

/// Answers searches from a fixed table; unknown queries fail.
#[derive(Default)]
struct ScriptedSearch {
    hits: HashMap<String, Vec<SearchHit>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    fn with(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.hits.insert(query.to_string(), hits);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn text(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ResearchError> {
        self.calls.lock().unwrap().push(query.to_string());
        match self.hits.get(query) {
            Some(hits) => Ok(hits.iter().take(options.max_results).cloned().collect()),
            None => Err(ResearchError::search(query, "connection reset")),
        }
    }
}

fn expansion(queries: &[&str]) -> String {
    serde_json::json!({ "thoughts": "cover the angles", "queries": queries }).to_string()
}

fn multi_hit_options() -> SearchOptions {
    SearchOptions {
        max_results: 5,
        ..SearchOptions::default()
    }
}

#[tokio::test]
async fn failed_search_is_skipped_and_run_continues() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["a", "b"]))
            .respond(SEARCH_AGENT, "summary of A")
            .respond(SYNTHESIS_AGENT, "# Report"),
    );
    let search = Arc::new(
        ScriptedSearch::default().with("a", vec![SearchHit::new("Title A", "https://a.example")]),
    );

    let mut coordinator = ResearchCoordinator::new("X", runner.clone(), search.clone());
    let report = coordinator.research().await.expect("run should succeed");

    assert_eq!(report, "# Report");
    assert_eq!(search.calls(), vec!["a", "b"]);
    assert_eq!(coordinator.search_results().len(), 1);
    assert_eq!(coordinator.search_results()[0].title, "Title A");
    assert_eq!(coordinator.search_results()[0].summary, "summary of A");

    let synthesis_inputs = runner.calls_for(SYNTHESIS_AGENT);
    assert_eq!(synthesis_inputs.len(), 1);
    assert!(synthesis_inputs[0].starts_with("Query: X\n\nSearch Results: \n"));
    assert!(synthesis_inputs[0].contains("\n1. Title: Title A\n    URL: https://a.example\n"));
    assert!(!synthesis_inputs[0].contains("\n2. "));
}

#[tokio::test]
async fn empty_expansion_skips_search_and_still_synthesizes() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&[]))
            .respond(SYNTHESIS_AGENT, "nothing found, verbatim"),
    );
    let search = Arc::new(ScriptedSearch::default());

    let mut coordinator = ResearchCoordinator::new("X", runner.clone(), search.clone());
    let report = coordinator.research().await.unwrap();

    assert_eq!(report, "nothing found, verbatim");
    assert!(search.calls().is_empty());
    assert!(runner.calls_for(SEARCH_AGENT).is_empty());
    assert!(coordinator.search_results().is_empty());
    assert_eq!(
        runner.calls_for(SYNTHESIS_AGENT),
        vec!["Query: X\n\nSearch Results: \n".to_string()]
    );
}

#[tokio::test]
async fn findings_follow_subquery_then_hit_order() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["first", "second"]))
            .respond(SEARCH_AGENT, "s1")
            .respond(SEARCH_AGENT, "s2")
            .respond(SEARCH_AGENT, "s3")
            .respond(SYNTHESIS_AGENT, "report"),
    );
    let search = Arc::new(
        ScriptedSearch::default()
            .with(
                "first",
                vec![
                    SearchHit::new("F1", "https://f1.example"),
                    SearchHit::new("F2", "https://f2.example"),
                ],
            )
            .with("second", vec![SearchHit::new("S1", "https://s1.example")]),
    );

    let mut coordinator = ResearchCoordinator::new("order", runner.clone(), search)
        .with_search_options(multi_hit_options());
    coordinator.research().await.unwrap();

    let titles: Vec<_> = coordinator
        .search_results()
        .iter()
        .map(|result| result.title.as_str())
        .collect();
    assert_eq!(titles, vec!["F1", "F2", "S1"]);

    assert_eq!(
        runner.calls_for(SEARCH_AGENT),
        vec![
            "Title: F1\nURL: https://f1.example",
            "Title: F2\nURL: https://f2.example",
            "Title: S1\nURL: https://s1.example",
        ]
    );

    let synthesis_input = &runner.calls_for(SYNTHESIS_AGENT)[0];
    for (idx, (title, summary)) in [("F1", "s1"), ("F2", "s2"), ("S1", "s3")].iter().enumerate() {
        let entry = format!("\n{}. Title: {title}\n", idx + 1);
        assert_eq!(synthesis_input.matches(&entry).count(), 1);
        assert_eq!(
            synthesis_input
                .matches(&format!("    Summary: {summary}\n"))
                .count(),
            1
        );
    }
}

#[tokio::test]
async fn default_options_keep_one_hit_per_subquery() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["only"]))
            .respond(SEARCH_AGENT, "s")
            .respond(SYNTHESIS_AGENT, "r"),
    );
    let search = Arc::new(ScriptedSearch::default().with(
        "only",
        vec![
            SearchHit::new("One", "https://1.example"),
            SearchHit::new("Two", "https://2.example"),
        ],
    ));

    let mut coordinator = ResearchCoordinator::new("q", runner, search);
    coordinator.research().await.unwrap();

    assert_eq!(coordinator.search_results().len(), 1);
}

#[tokio::test]
async fn identical_scripts_produce_identical_reports() {
    async fn run_once() -> String {
        let runner = Arc::new(
            ScriptedRunner::default()
                .respond(QUERY_AGENT, &expansion(&["a"]))
                .respond(SEARCH_AGENT, "summary")
                .respond(SYNTHESIS_AGENT, "## Deterministic report"),
        );
        let search = Arc::new(
            ScriptedSearch::default().with("a", vec![SearchHit::new("A", "https://a.example")]),
        );
        ResearchCoordinator::new("same question", runner, search)
            .research()
            .await
            .unwrap()
    }

    assert_eq!(run_once().await, run_once().await);
}

#[tokio::test]
async fn expansion_failure_is_fatal() {
    let runner = Arc::new(ScriptedRunner::default().fail(QUERY_AGENT, "model overloaded"));
    let search = Arc::new(ScriptedSearch::default());

    let mut coordinator = ResearchCoordinator::new("X", runner.clone(), search.clone());
    let err = coordinator.research().await.unwrap_err();

    assert!(err.to_string().contains("model overloaded"), "{err}");
    assert!(search.calls().is_empty());
    assert!(runner.calls_for(SYNTHESIS_AGENT).is_empty());
}

#[tokio::test]
async fn malformed_expansion_is_fatal() {
    let runner = Arc::new(
        ScriptedRunner::default().respond(QUERY_AGENT, "I would search for batteries."),
    );
    let search = Arc::new(ScriptedSearch::default());

    let mut coordinator = ResearchCoordinator::new("X", runner, search.clone());
    let err = coordinator.research().await.unwrap_err();

    assert!(err.to_string().contains("malformed output"), "{err}");
    assert!(search.calls().is_empty());
}

#[tokio::test]
async fn summarization_failure_is_fatal() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["a"]))
            .fail(SEARCH_AGENT, "context window exceeded")
            .respond(SYNTHESIS_AGENT, "unused"),
    );
    let search = Arc::new(
        ScriptedSearch::default().with("a", vec![SearchHit::new("A", "https://a.example")]),
    );

    let mut coordinator = ResearchCoordinator::new("X", runner.clone(), search);
    let err = coordinator.research().await.unwrap_err();

    assert!(err.to_string().contains("context window exceeded"), "{err}");
    assert!(runner.calls_for(SYNTHESIS_AGENT).is_empty());
}

#[tokio::test]
async fn summarization_failure_keeps_earlier_findings() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["a", "b"]))
            .respond(SEARCH_AGENT, "summary of A")
            .fail(SEARCH_AGENT, "boom"),
    );
    let search = Arc::new(
        ScriptedSearch::default()
            .with("a", vec![SearchHit::new("A", "https://a.example")])
            .with("b", vec![SearchHit::new("B", "https://b.example")]),
    );

    let mut coordinator = ResearchCoordinator::new("X", runner.clone(), search);
    let err = coordinator.research().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "workflow failure: Task 'summarize' failed: agent `search_agent` failed: boom"
    );
    assert_eq!(coordinator.search_results().len(), 1);
    assert_eq!(coordinator.search_results()[0].summary, "summary of A");
    assert!(runner.calls_for(SYNTHESIS_AGENT).is_empty());
}

#[tokio::test]
async fn synthesis_failure_is_fatal() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&[]))
            .fail(SYNTHESIS_AGENT, "quota exhausted"),
    );

    let mut coordinator =
        ResearchCoordinator::new("X", runner, Arc::new(ScriptedSearch::default()));
    let err = coordinator.research().await.unwrap_err();

    assert!(err.to_string().contains("quota exhausted"), "{err}");
}

#[tokio::test]
async fn coordinator_runs_only_once() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&[]))
            .respond(SYNTHESIS_AGENT, "r"),
    );
    let mut coordinator =
        ResearchCoordinator::new("X", runner, Arc::new(ScriptedSearch::default()));

    coordinator.research().await.unwrap();
    let err = coordinator.research().await.unwrap_err();

    assert!(matches!(err, ResearchError::AlreadyCompleted));
}

#[tokio::test]
async fn exposes_expansion_and_trace_after_run() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["a", "b"]))
            .respond(SEARCH_AGENT, "sa")
            .respond(SEARCH_AGENT, "sb")
            .respond(SYNTHESIS_AGENT, "r"),
    );
    let search = Arc::new(
        ScriptedSearch::default()
            .with("a", vec![SearchHit::new("A", "https://a.example")])
            .with("b", vec![SearchHit::new("B", "https://b.example")]),
    );

    let mut coordinator =
        ResearchCoordinator::new("X", runner, search).with_run_id("research-fixed");
    coordinator.research().await.unwrap();

    assert_eq!(coordinator.run_id(), "research-fixed");
    let response = coordinator.query_response().expect("expansion recorded");
    assert_eq!(response.thoughts, "cover the angles");
    assert_eq!(response.queries, vec!["a", "b"]);

    let steps: Vec<_> = coordinator
        .trace()
        .events()
        .iter()
        .map(|event| event.task_id.as_str())
        .collect();
    assert_eq!(steps, vec!["query_expansion", "web_search", "summarize", "synthesis"]);
}

#[tokio::test]
async fn emits_progress_events() {
    let runner = Arc::new(
        ScriptedRunner::default()
            .respond(QUERY_AGENT, &expansion(&["a", "b"]))
            .respond(SEARCH_AGENT, "summary of A")
            .respond(SYNTHESIS_AGENT, "r"),
    );
    let search = Arc::new(
        ScriptedSearch::default().with("a", vec![SearchHit::new("A", "https://a.example")]),
    );
    let (events, mut receiver) = EventCollector::new();

    let mut coordinator = ResearchCoordinator::new("X", runner, search).with_events(events);
    coordinator.research().await.unwrap();
    drop(coordinator);

    let mut kinds = Vec::new();
    while let Some(event) = receiver.recv().await {
        kinds.push(event.kind);
    }

    assert!(kinds.iter().any(|kind| matches!(
        kind,
        EventKind::QueriesGenerated { queries, .. } if queries == &vec!["a".to_string(), "b".to_string()]
    )));
    assert!(kinds.iter().any(|kind| matches!(
        kind,
        EventKind::SearchFailed { query, .. } if query == "b"
    )));
    assert!(kinds.iter().any(|kind| matches!(
        kind,
        EventKind::ResearchRunComplete { sources: 1, queries: 2 }
    )));
    assert!(matches!(kinds.last(), Some(EventKind::ReportReady { chars: 1 })));
}
