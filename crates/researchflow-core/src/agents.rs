//! Agent definitions and the runner seam used by the research workflow.
//!
//! An [`Agent`] is a named prompt plus the shape of output it is expected to
//! produce. Execution is delegated to an [`AgentRunner`], which lets tests
//! swap the language-model backend for scripted responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ResearchError;

/// Shape of the final output an agent is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub instructions: String,
    pub output: OutputKind,
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, output: OutputKind) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            output,
        }
    }
}

/// Executes an agent against a text input and returns its final output.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, agent: &Agent, input: &str) -> Result<String, ResearchError>;
}

pub const QUERY_AGENT: &str = "query_agent";
pub const SEARCH_AGENT: &str = "search_agent";
pub const SYNTHESIS_AGENT: &str = "synthesis_agent";

const QUERY_INSTRUCTIONS: &str = "\
You help plan web research. Given a research question, think about which angles \
must be covered to answer it well, then write 3 to 5 concise web search queries \
that together cover those angles. Respond with a JSON object of the form \
{\"thoughts\": \"<your reasoning>\", \"queries\": [\"<query>\", ...]} and nothing else.";

const SEARCH_INSTRUCTIONS: &str = "\
You analyse a single web search result given only its title and URL. \
Write a short summary (2 to 4 sentences) of what the source most likely covers \
and how it could help answer a research question. Mention the publisher when the \
URL makes it obvious. Do not invent specific figures.";

const SYNTHESIS_INSTRUCTIONS: &str = "\
You write research reports. You receive the original research question and a \
numbered list of sources with summaries. Produce a well structured Markdown report \
with an overview, key findings, open questions and a list of the cited sources. \
Reference sources by their number. If no sources are provided, say so and answer \
from general knowledge while flagging the lack of evidence.";

pub fn query_agent() -> Agent {
    Agent::new(QUERY_AGENT, QUERY_INSTRUCTIONS, OutputKind::Json)
}

pub fn search_agent() -> Agent {
    Agent::new(SEARCH_AGENT, SEARCH_INSTRUCTIONS, OutputKind::Text)
}

pub fn synthesis_agent() -> Agent {
    Agent::new(SYNTHESIS_AGENT, SYNTHESIS_INSTRUCTIONS, OutputKind::Text)
}

/// The three agents driven by a research run.
#[derive(Debug, Clone)]
pub struct AgentSet {
    pub query: Agent,
    pub search: Agent,
    pub synthesis: Agent,
}

impl Default for AgentSet {
    fn default() -> Self {
        Self {
            query: query_agent(),
            search: search_agent(),
            synthesis: synthesis_agent(),
        }
    }
}
