//! `AgentRunner` backed by an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::agents::{Agent, AgentRunner, OutputKind};
use crate::config::LlmConfig;
use crate::{ResearchError, SecretValue};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiChatRunner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretValue,
}

impl OpenAiChatRunner {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: SecretValue,
        timeout: Duration,
    ) -> Result<Self, ResearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ResearchError::InvalidConfiguration(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &LlmConfig, api_key: SecretValue) -> Result<Self, ResearchError> {
        Self::new(
            &config.base_url,
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl AgentRunner for OpenAiChatRunner {
    #[instrument(name = "agent.run", skip(self, agent, input), fields(agent = %agent.name, model = %self.model))]
    async fn run(&self, agent: &Agent, input: &str) -> Result<String, ResearchError> {
        let messages = [
            ChatMessage {
                role: "system",
                content: &agent.instructions,
            },
            ChatMessage {
                role: "user",
                content: input,
            },
        ];

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if agent.output == OutputKind::Json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| ResearchError::agent(&agent.name, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ResearchError::agent(
                &agent.name,
                format!("HTTP status {status}: {}", detail.trim()),
            ));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|err| ResearchError::agent(&agent.name, err.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ResearchError::agent(&agent.name, "response contained no content"))?;

        debug!(chars = content.len(), "agent produced output");
        Ok(content)
    }
}
