//! Records passed between the phases of a research run.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ResearchError;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").expect("invalid fence regex")
});

/// Structured output of the query-expansion agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub thoughts: String,
    pub queries: Vec<String>,
}

impl QueryResponse {
    /// Decode the raw agent output, tolerating a surrounding Markdown code fence.
    pub fn from_agent_output(agent: &str, raw: &str) -> Result<Self, ResearchError> {
        let payload = CODE_FENCE
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(raw)
            .trim();

        serde_json::from_str(payload).map_err(|err| ResearchError::MalformedOutput {
            agent: agent.to_string(),
            reason: err.to_string(),
        })
    }
}

/// One raw hit returned by a search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
        }
    }

    /// Input handed to the summarization agent. Page content is never fetched.
    pub fn summarization_input(&self) -> String {
        format!("Title: {}\nURL: {}", self.title, self.href)
    }
}

/// Hits gathered for a single sub-query; empty when the search failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQueryHits {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// A finding: one summarized search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub summary: String,
}

/// Render the text block handed to the synthesis agent.
pub fn findings_text(query: &str, results: &[SearchResult]) -> String {
    let mut text = format!("Query: {query}\n\nSearch Results: \n");
    for (idx, result) in results.iter().enumerate() {
        let _ = write!(
            text,
            "\n{}. Title: {}\n    URL: {}\n    Summary: {}\n",
            idx + 1,
            result.title,
            result.url,
            result.summary
        );
    }
    text
}

/// First `limit` characters of `text`, with an ellipsis when truncated.
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
