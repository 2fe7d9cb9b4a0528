//! Ollama chat backend.
//!
//! Keeps the teacher's retry-with-backoff shape and request/response wire
//! types; drops KV-cache session reuse and the OpenAI/Claude backends, which
//! have no counterpart in this system's single-endpoint `LlmConfig`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::Message;
use crate::LlmError;

/// Ollama connection and generation parameters.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub keep_alive: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            keep_alive: "5m".to_string(),
        }
    }
}

impl From<&ckd_config::LlmConfig> for OllamaConfig {
    fn from(config: &ckd_config::LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub tokens: usize,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Cancelled,
}

/// Generation backend seam. `ckd-llm` implements this once (Ollama); the
/// [`crate::adapter::LanguageModelAdapter`] bridges it to
/// `ckd_core::LanguageModel`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;

    /// Rough token estimate (chars/4) used for pre-dispatch accounting.
    fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().max(1) / 4
    }
}

#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    async fn execute_request(&self, request: &OllamaChatRequest) -> Result<OllamaChatResponse, LlmError> {
        let mut req = self.client.post(self.api_url("/chat")).json(request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(|m| m.into()).collect(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
                top_p: Some(self.config.top_p),
                num_predict: Some(self.config.max_tokens as i32),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
        };

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "LLM request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&request).await {
                Ok(result) => {
                    return Ok(GenerationResult {
                        text: result.message.content,
                        tokens: result.eval_count.unwrap_or(0) as usize,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        finish_reason: if result.done {
                            FinishReason::Stop
                        } else {
                            FinishReason::Length
                        },
                    });
                }
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        use futures::StreamExt;

        let start = std::time::Instant::now();
        let mut total_tokens = 0;
        let mut full_response = String::new();

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(|m| m.into()).collect(),
            stream: true,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
                top_p: Some(self.config.top_p),
                num_predict: Some(self.config.max_tokens as i32),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
        };

        let mut req = self.client.post(self.api_url("/chat")).json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(error));
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let text = String::from_utf8_lossy(&chunk);

            for line in text.lines() {
                if line.is_empty() {
                    continue;
                }
                if let Ok(chunk_response) = serde_json::from_str::<OllamaStreamChunk>(line) {
                    let token = &chunk_response.message.content;
                    full_response.push_str(token);
                    total_tokens += 1;

                    if tx.send(token.clone()).await.is_err() {
                        return Ok(GenerationResult {
                            text: full_response,
                            tokens: total_tokens,
                            total_time_ms: start.elapsed().as_millis() as u64,
                            finish_reason: FinishReason::Cancelled,
                        });
                    }

                    if chunk_response.done {
                        break;
                    }
                }
            }
        }

        Ok(GenerationResult {
            text: full_response,
            tokens: total_tokens,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.config.endpoint))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaMessage,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    #[test]
    fn test_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.model, "llama3.1");
        assert_eq!(config.keep_alive, "5m");
    }

    #[test]
    fn test_message_conversion() {
        let msg = Message {
            role: Role::User,
            content: "Hello".to_string(),
        };
        let ollama_msg: OllamaMessage = (&msg).into();
        assert_eq!(ollama_msg.role, "user");
        assert_eq!(ollama_msg.content, "Hello");
    }

    #[test]
    fn test_config_from_ckd_config() {
        let llm_config = ckd_config::LlmConfig::default();
        let ollama_config = OllamaConfig::from(&llm_config);
        assert_eq!(ollama_config.model, llm_config.model);
        assert_eq!(ollama_config.endpoint, llm_config.endpoint);
    }
}
