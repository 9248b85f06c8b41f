use std::path::PathBuf;

use thiserror::Error;

/// Core error type for ResearchFlow.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("agent `{agent}` failed: {message}")]
    Agent { agent: String, message: String },
    #[error("agent `{agent}` returned malformed output: {reason}")]
    MalformedOutput { agent: String, reason: String },
    #[error("search for \"{query}\" failed: {message}")]
    Search { query: String, message: String },
    #[error("workflow failure: {0}")]
    Workflow(String),
    #[error("research run already completed for this coordinator")]
    AlreadyCompleted,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            message: message.into(),
        }
    }

    pub fn search(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Search {
            query: query.into(),
            message: message.into(),
        }
    }
}

/// Convert a task-level failure into the error type understood by `graph_flow`.
///
/// `graph_flow` already reports task errors as `TaskExecutionFailed`, so the
/// error is carried as-is to avoid a second prefix.
impl From<ResearchError> for graph_flow::GraphError {
    fn from(err: ResearchError) -> Self {
        graph_flow::GraphError::Other(anyhow::Error::new(err))
    }
}

/// Map a runner failure back into a [`ResearchError`].
pub(crate) fn from_graph_error(err: graph_flow::GraphError) -> ResearchError {
    match err {
        graph_flow::GraphError::TaskExecutionFailed(message) => ResearchError::Workflow(message),
        other => ResearchError::Workflow(other.to_string()),
    }
}
