// Azure OpenAI client: chat completions and embeddings for a single,
// explicitly configured deployment each.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::OpenAiConfig;
use crate::error::{ApiError, Result};
use crate::retry::send_with_retry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
    max_retries: u32,
}

impl AzureOpenAiClient {
    pub fn new(client: reqwest::Client, config: OpenAiConfig, max_retries: u32) -> Self {
        Self { client, config, max_retries }
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.config.endpoint, deployment, operation, self.config.api_version
        )
    }

    /// Run one chat completion at temperature 0 and return the assistant text.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let url = self.deployment_url(&self.config.chat_deployment, "chat/completions");
        let body = ChatRequest { messages, temperature: 0.0 };

        let response = send_with_retry("chat completion", self.max_retries, || {
            self.client
                .post(&url)
                .header("api-key", &self.config.api_key)
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Chat completion failed with {}: {}", status, text);
            return Err(ApiError::LlmError(format!(
                "chat completion on '{}' failed with status {}",
                self.config.chat_deployment, status
            )));
        }

        let completion: ChatCompletion = serde_json::from_str(&text)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!("Chat completion returned {} chars", content.len());
        Ok(content)
    }

    /// Embed `text` with the configured embedding deployment. Any failure is
    /// reported as `EmbeddingUnavailable`.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let deployment = &self.config.embedding_deployment;
        let unavailable = |reason: String| ApiError::EmbeddingUnavailable {
            deployment: deployment.clone(),
            reason,
        };

        let url = self.deployment_url(deployment, "embeddings");
        let body = EmbeddingRequest { input: [text] };

        let response = send_with_retry("embedding", self.max_retries, || {
            self.client
                .post(&url)
                .header("api-key", &self.config.api_key)
                .json(&body)
                .send()
        })
        .await
        .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| unavailable(e.to_string()))?;
        if !status.is_success() {
            error!("Embedding request failed with {}: {}", status, raw);
            return Err(unavailable(format!("status {status}")));
        }

        let parsed: EmbeddingResponse =
            serde_json::from_str(&raw).map_err(|e| unavailable(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| unavailable("empty embedding response".to_string()))
    }
}
