//! Session-scoped data model: `Session`, `ConversationEntry`, `TokenLedger`.
//! `ckd-server` owns the mutable `SessionManager`/`ContextTracker` machinery
//! that operates on these types; this module only defines their shape so
//! `ckd-agent` and `ckd-server` can agree on it without a crate-cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One exchange recorded against a session. Append-only: never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_type: String,
    pub user_input: String,
    pub agent_response: String,
}

/// Client-scoped context within which history and token usage accrue.
///
/// Invariants:
/// - `created_at <= last_activity`
/// - absolute lifetime <= `session_timeout` (enforced by `ckd-server`)
/// - idle eviction purges `conversation_history` but retains the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: Option<String>,
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active_agent: Option<String>,
    pub conversation_history: Vec<ConversationEntry>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user_id: Option<String>, room_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id,
            room_id,
            created_at: now,
            last_activity: now,
            active_agent: None,
            conversation_history: Vec::new(),
        }
    }
}

/// Per-session per-agent-type token accounting.
///
/// Bookkeeping is best-effort accurate: admission is checked *before*
/// dispatch using an estimator, and the ledger is updated *after* dispatch
/// with the actual value reported by the agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    pub usage_by_agent: HashMap<String, u64>,
}

impl TokenLedger {
    pub fn total(&self) -> u64 {
        self.usage_by_agent.values().sum()
    }

    pub fn track(&mut self, agent_type: &str, tokens_used: u64) {
        *self.usage_by_agent.entry(agent_type.to_string()).or_insert(0) += tokens_used;
    }

    pub fn usage_for(&self, agent_type: &str) -> u64 {
        self.usage_by_agent.get(agent_type).copied().unwrap_or(0)
    }
}

/// Result of `ContextTracker::check_limit`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitCheck {
    pub within_limit: bool,
    pub current_usage: u64,
    pub max_limit: u64,
    pub remaining: u64,
    pub would_exceed: bool,
}
