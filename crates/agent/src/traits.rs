//! The `Agent` trait every registry entry — local domain agent, router, or
//! remote adapter — implements.

use async_trait::async_trait;
use ckd_core::{AgentChunk, AgentRequest, AgentResponse};
use tokio::sync::mpsc;

use crate::error::AgentError;

/// Whether an agent runs in-process or is proxied to another service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Local,
    Remote,
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionType::Local => write!(f, "local"),
            ExecutionType::Remote => write!(f, "remote"),
        }
    }
}

/// Static metadata returned by [`Agent::metadata`], used for
/// `AgentRegistry::get_agents_info`.
#[derive(Debug, Clone)]
pub struct AgentMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub execution_type: ExecutionType,
}

impl AgentMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Vec::new(),
            execution_type: ExecutionType::Local,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_execution_type(mut self, execution_type: ExecutionType) -> Self {
        self.execution_type = execution_type;
        self
    }
}

/// Uniform interface every registered agent — local or remote — satisfies.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The registry tag this agent is registered under (e.g. `"nutrition"`).
    fn agent_type(&self) -> &str;

    fn metadata(&self) -> AgentMetadata;

    /// Rough token cost of processing `text`, used by the policy layer for
    /// pre-dispatch admission control. The default is a coarse
    /// characters-per-token heuristic; agents backed by a language model
    /// should override this with the model's own tokenizer estimate.
    fn estimate_context_usage(&self, text: &str) -> u32 {
        (text.len() / 4).max(1) as u32
    }

    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError>;

    /// Streaming variant. The default forwards `process`'s result as a
    /// single `complete` chunk; override for true incremental streaming.
    async fn process_stream(
        &self,
        request: &AgentRequest,
    ) -> Result<mpsc::Receiver<AgentChunk>, AgentError> {
        let (tx, rx) = mpsc::channel(1);
        let response = self.process(request).await?;
        let _ = tx
            .send(AgentChunk::new(
                response.answer,
                ckd_core::ChunkStatus::Complete,
                self.agent_type(),
            ))
            .await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_agent_object_safe(_: &dyn Agent) {}
}
