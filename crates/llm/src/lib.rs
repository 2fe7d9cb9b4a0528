//! LLM backend abstraction used for the router's two LLM calls — intent
//! classification and multi-agent answer synthesis — plus the prompt
//! construction for both.
//!
//! Generation itself (the Ollama endpoint) is an external collaborator;
//! this crate only owns the client, the retry/backoff envelope around it,
//! and the adapter onto `ckd_core::LanguageModel`.

pub mod adapter;
pub mod backend;
pub mod prompt;

pub use adapter::LanguageModelAdapter;
pub use backend::{FinishReason, GenerationResult, LlmBackend, OllamaBackend, OllamaConfig};
pub use prompt::{
    classifier_request, concatenate_fallback, parse_classifier_output, synthesis_request,
    ClassifierOutput, Message, Role, INTENT_TAGS,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for ckd_core::CoreError {
    fn from(err: LlmError) -> Self {
        ckd_core::CoreError::ExternalService {
            service: "ckd-llm".to_string(),
            message: err.to_string(),
        }
    }
}
