//! Shared remote-agent state shape. The adapter implementation and its
//! circuit-breaker/retry logic live in `ckd-agent`; this is just the state
//! shape so it can be surfaced through health/diagnostic endpoints in
//! `ckd-server` without depending back on `ckd-agent` internals.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit-breaker state. Transitions are strictly
/// `closed -> open -> half_open -> (closed | open)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAgentState {
    pub base_url: String,
    pub circuit_state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub polling_offset: u64,
    pub active_trace_ids: HashSet<String>,
}

impl RemoteAgentState {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            circuit_state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            polling_offset: 0,
            active_trace_ids: HashSet::new(),
        }
    }
}

/// One event in the remote agent's event-polling protocol.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteEvent {
    pub kind: String,
    pub source: String,
    pub offset: u64,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RemoteEvent {
    /// The substring of `correlation_id` before `::`, i.e. the base
    /// correlation id shared by every event in one response trace.
    pub fn base_correlation_id(&self) -> &str {
        match self.correlation_id.split_once("::") {
            Some((base, _)) => base,
            None => &self.correlation_id,
        }
    }

    pub fn is_agent_message(&self) -> bool {
        self.kind == "message" && self.source == "agent"
    }

    pub fn status(&self) -> Option<&str> {
        if self.kind == "status" {
            self.data.get("status").and_then(|v| v.as_str())
        } else {
            None
        }
    }
}
