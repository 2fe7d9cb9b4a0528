//! Agent registry: a process-wide map from lowercase type tag to a
//! constructed agent instance. `list_agents`/`get_agents_info` support
//! diagnostics; `get` raises [`AgentError::NotFound`] for an unknown tag.
//!
//! Unlike the original's class-registry-plus-factory (which constructs a
//! fresh instance per lookup via `**dependencies`), this registry holds
//! already-constructed `Arc<dyn Agent>` instances: dependency injection
//! happens once at process start via each adapter's own constructor, which
//! is the idiomatic Rust shape for shared, long-lived clients (the LLM
//! backend, the retrieval engine, remote HTTP clients).

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::AgentError;
use crate::traits::{Agent, AgentMetadata};

#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.agent_type().to_string(), agent);
    }

    pub fn get(&self, agent_type: &str) -> Result<Arc<dyn Agent>, AgentError> {
        self.agents
            .get(agent_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::NotFound(agent_type.to_string()))
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.agents.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get_agents_info(&self) -> Vec<(String, AgentMetadata)> {
        self.agents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metadata()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ckd_core::{AgentRequest, AgentResponse};

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn agent_type(&self) -> &str {
            "echo"
        }

        fn metadata(&self) -> AgentMetadata {
            AgentMetadata::new("Echo", "Echoes the query back")
        }

        async fn process(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
            Ok(AgentResponse::success("echo", request.query.clone()))
        }
    }

    #[test]
    fn register_and_lookup_round_trips() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent));

        assert_eq!(registry.list_agents(), vec!["echo".to_string()]);
        assert!(registry.get("echo").is_ok());
    }

    #[test]
    fn unknown_tag_returns_not_found() {
        let registry = AgentRegistry::new();
        match registry.get("missing") {
            Err(AgentError::NotFound(tag)) => assert_eq!(tag, "missing"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
