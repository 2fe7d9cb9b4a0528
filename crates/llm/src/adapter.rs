//! Bridges the backend-local [`LlmBackend`] trait to `ckd_core::LanguageModel`,
//! the trait every caller outside this crate actually depends on.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use ckd_core::{
    CoreError, FinishReason as CoreFinishReason, GenerateRequest, GenerateResponse,
    LanguageModel, Result, StreamChunk, TokenUsage, ToolDefinition,
};

use crate::backend::{FinishReason as BackendFinishReason, LlmBackend};
use crate::prompt::Message;

pub struct LanguageModelAdapter {
    backend: Arc<dyn LlmBackend>,
    model_name: String,
    context_size: usize,
}

impl LanguageModelAdapter {
    pub fn new<B: LlmBackend + 'static>(backend: B, context_size: usize) -> Self {
        let model_name = backend.model_name().to_string();
        Self {
            backend: Arc::new(backend),
            model_name,
            context_size,
        }
    }

    fn convert_messages(request: &GenerateRequest) -> Vec<Message> {
        request.messages.iter().map(Into::into).collect()
    }

    fn convert_finish_reason(reason: BackendFinishReason) -> CoreFinishReason {
        match reason {
            BackendFinishReason::Stop => CoreFinishReason::Stop,
            BackendFinishReason::Length => CoreFinishReason::Length,
            BackendFinishReason::Error | BackendFinishReason::Cancelled => CoreFinishReason::Error,
        }
    }
}

impl From<&ckd_core::Message> for Message {
    fn from(msg: &ckd_core::Message) -> Self {
        Self {
            role: match msg.role {
                ckd_core::Role::System => crate::prompt::Role::System,
                ckd_core::Role::User => crate::prompt::Role::User,
                ckd_core::Role::Assistant => crate::prompt::Role::Assistant,
                ckd_core::Role::Tool => crate::prompt::Role::Tool,
            },
            content: msg.content.clone(),
        }
    }
}

#[async_trait]
impl LanguageModel for LanguageModelAdapter {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let messages = Self::convert_messages(&request);

        self.backend
            .generate(&messages)
            .await
            .map(|result| GenerateResponse {
                text: result.text,
                finish_reason: Self::convert_finish_reason(result.finish_reason),
                usage: Some(TokenUsage::new(0, result.tokens as u32)),
                tool_calls: Vec::new(),
            })
            .map_err(|e| CoreError::ExternalService {
                service: "ckd-llm".to_string(),
                message: e.to_string(),
            })
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send + 'a>> {
        let messages = Self::convert_messages(&request);
        let backend = self.backend.clone();

        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::channel::<String>(100);

            let stream_task = tokio::spawn(async move {
                backend.generate_stream(&messages, tx).await
            });

            while let Some(text) = rx.recv().await {
                yield Ok(StreamChunk::text(text));
            }

            match stream_task.await {
                Ok(Ok(result)) => {
                    yield Ok(StreamChunk {
                        delta: String::new(),
                        is_final: true,
                        finish_reason: Some(Self::convert_finish_reason(result.finish_reason)),
                    });
                }
                Ok(Err(e)) => {
                    yield Err(CoreError::ExternalService {
                        service: "ckd-llm".to_string(),
                        message: format!("stream error: {e}"),
                    });
                }
                Err(e) => {
                    yield Err(CoreError::Other(format!("LLM stream task panicked: {e}")));
                }
            }
        })
    }

    async fn generate_with_tools(
        &self,
        request: GenerateRequest,
        tools: &[ToolDefinition],
    ) -> Result<GenerateResponse> {
        // No domain agent in this system uses tool calling; the parameter
        // exists to satisfy the trait and for forward compatibility.
        let _ = tools;
        self.generate(request).await
    }

    async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.backend.estimate_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationResult;

    struct MockBackend {
        response: String,
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn generate(&self, _messages: &[Message]) -> std::result::Result<GenerationResult, crate::LlmError> {
            Ok(GenerationResult {
                text: self.response.clone(),
                tokens: 10,
                total_time_ms: 100,
                finish_reason: BackendFinishReason::Stop,
            })
        }

        async fn generate_stream(
            &self,
            _messages: &[Message],
            tx: mpsc::Sender<String>,
        ) -> std::result::Result<GenerationResult, crate::LlmError> {
            for word in self.response.split_whitespace() {
                let _ = tx.send(format!("{word} ")).await;
            }
            Ok(GenerationResult {
                text: self.response.clone(),
                tokens: 10,
                total_time_ms: 100,
                finish_reason: BackendFinishReason::Stop,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }
    }

    #[tokio::test]
    async fn adapter_generate_roundtrips_backend_response() {
        let backend = MockBackend { response: "Hello, world!".to_string() };
        let adapter = LanguageModelAdapter::new(backend, 4096);

        let request = GenerateRequest::new("You are helpful").with_user_message("Hi");
        let response = adapter.generate(request).await.unwrap();
        assert_eq!(response.text, "Hello, world!");
        assert_eq!(response.finish_reason, CoreFinishReason::Stop);
    }

    #[tokio::test]
    async fn adapter_reports_availability_from_backend() {
        let backend = MockBackend { response: "test".to_string() };
        let adapter = LanguageModelAdapter::new(backend, 4096);
        assert!(adapter.is_available().await);
    }

    #[test]
    fn adapter_exposes_model_name() {
        let backend = MockBackend { response: "test".to_string() };
        let adapter = LanguageModelAdapter::new(backend, 4096);
        assert_eq!(adapter.model_name(), "mock-model");
    }
}
