//! The uniform agent request/response contract.
//!
//! Every registered agent — local or remote — accepts an [`AgentRequest`]
//! and returns an [`AgentResponse`]. This is the one data shape the router,
//! the registry, and the remote-agent adapter all agree on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User profile, controlling verbosity and result caps downstream.
///
/// Modeled as a closed enumeration (source: `contracts.py`'s
/// `profile: str = "general"`) rather than a free string so an unrecognized
/// profile fails at deserialization instead of silently falling through
/// string comparisons at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Researcher,
    Patient,
    #[default]
    General,
}

/// Status of an [`AgentResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Error,
    Partial,
}

/// Recognized `context` keys. `AgentRequest::context` stays a free-form bag
/// (callers may stuff in agent-specific keys) but the orchestrator and
/// router only ever read these.
pub mod context_keys {
    pub const TARGET_AGENT: &str = "target_agent";
    pub const USER_HISTORY: &str = "user_history";
    pub const HAS_IMAGE: &str = "has_image";
    pub const IMAGE_DATA: &str = "image_data";
}

/// The uniform call to any agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub query: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_language() -> String {
    "en".to_string()
}

impl AgentRequest {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            user_id: None,
            context: HashMap::new(),
            profile: Profile::default(),
            language: default_language(),
            timestamp: Utc::now(),
        }
    }

    /// The `context.target_agent` override, if present and a valid string.
    pub fn target_agent(&self) -> Option<&str> {
        self.context.get(context_keys::TARGET_AGENT).and_then(Value::as_str)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// A literature or document reference surfaced by a domain agent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceRef {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// The uniform return value of any agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub papers: Vec<SourceRef>,
    #[serde(default)]
    pub tokens_used: u32,
    pub status: AgentStatus,
    pub agent_type: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    pub fn success(agent_type: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            papers: Vec::new(),
            tokens_used: 0,
            status: AgentStatus::Success,
            agent_type: agent_type.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(agent_type: impl Into<String>, user_message: impl Into<String>, error_code: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error_code".to_string(), Value::String(error_code.to_string()));
        Self {
            answer: user_message.into(),
            sources: Vec::new(),
            papers: Vec::new(),
            tokens_used: 0,
            status: AgentStatus::Error,
            agent_type: agent_type.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn with_tokens_used(mut self, tokens_used: u32) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A streamed progress chunk for `process_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Processing,
    Streaming,
    NewMessage,
    Partial,
    Synthesizing,
    Complete,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentChunk {
    pub content: String,
    pub status: ChunkStatus,
    pub agent_type: String,
}

impl AgentChunk {
    pub fn new(content: impl Into<String>, status: ChunkStatus, agent_type: impl Into<String>) -> Self {
        Self { content: content.into(), status, agent_type: agent_type.into() }
    }
}
