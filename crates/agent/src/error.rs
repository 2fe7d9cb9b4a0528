//! Agent-layer error taxonomy: registry lookup failures, remote-adapter
//! transport/protocol failures, and router classification/synthesis
//! failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent type '{0}' is not registered")]
    NotFound(String),

    #[error("circuit open for agent '{0}'")]
    CircuitOpen(String),

    #[error("agent '{agent_type}' exceeded max polling duration ({timeout_secs}s)")]
    Timeout { agent_type: String, timeout_secs: f64 },

    #[error("agent '{0}' server unavailable after retries")]
    ServerUnavailable(String),

    #[error("failed to parse remote agent response: {0}")]
    ResponseParse(String),

    #[error("remote agent HTTP error: {0}")]
    Http(String),

    #[error("remote agent reported execution error: {0}")]
    Execution(String),

    #[error("intent classification failed: {0}")]
    Classification(String),

    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Core(#[from] ckd_core::CoreError),
}

impl From<AgentError> for ckd_core::CoreError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Core(e) => e,
            other => ckd_core::CoreError::Other(other.to_string()),
        }
    }
}
