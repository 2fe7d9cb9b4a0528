//! Token accounting and admission control.
//!
//! Kept as two cooperating objects behind one [`SessionPolicy`] facade per
//! the consolidation decision in `DESIGN.md`: `ContextTracker` retains the
//! per-agent-type usage breakdown the router's reporting needs;
//! `PolicyEngine` retains the session-level absolute cap and the separate
//! 24h expiry sweep. Merging them into one struct would lose the
//! per-agent-type breakdown.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;

use ckd_core::{LimitCheck, TokenLedger};

use crate::error::ServerError;

/// Per-session per-agent-type token bookkeeping and pre-dispatch admission
/// checks.
pub struct ContextTracker {
    usage: RwLock<HashMap<String, TokenLedger>>,
    max_context_limit: u64,
}

impl ContextTracker {
    pub fn new(max_context_limit: u64) -> Self {
        Self { usage: RwLock::new(HashMap::new()), max_context_limit }
    }

    pub fn track_usage(&self, session_id: &str, agent_type: &str, tokens: u64) {
        self.usage.write().entry(session_id.to_string()).or_default().track(agent_type, tokens);
    }

    pub fn get_total_usage(&self, session_id: &str) -> u64 {
        self.usage.read().get(session_id).map(TokenLedger::total).unwrap_or(0)
    }

    /// Admission check performed *before* dispatch with an estimator; the
    /// ledger itself is only updated after dispatch via `track_usage`.
    pub fn check_limit(&self, session_id: &str, estimated_tokens: u64) -> LimitCheck {
        let current_usage = self.get_total_usage(session_id);
        let would_exceed = current_usage.saturating_add(estimated_tokens) > self.max_context_limit;
        LimitCheck {
            within_limit: !would_exceed,
            current_usage,
            max_limit: self.max_context_limit,
            remaining: self.max_context_limit.saturating_sub(current_usage),
            would_exceed,
        }
    }

    pub fn reset(&self, session_id: &str) {
        self.usage.write().remove(session_id);
    }
}

/// Session-level absolute token cap and the policy side's own stale-session
/// expiry window, distinct from `SessionManager`'s idle/absolute timeouts.
pub struct PolicyEngine {
    max_tokens_per_session: u64,
    session_expiry: ChronoDuration,
}

impl PolicyEngine {
    pub fn new(max_tokens_per_session: u64, session_expiry_hours: i64) -> Self {
        Self {
            max_tokens_per_session,
            session_expiry: ChronoDuration::hours(session_expiry_hours),
        }
    }

    pub fn is_expired(&self, created_at: DateTime<Utc>) -> bool {
        Utc::now().signed_duration_since(created_at) > self.session_expiry
    }

    pub fn max_tokens_per_session(&self) -> u64 {
        self.max_tokens_per_session
    }
}

/// Single admission-check facade the router calls before dispatch.
pub struct SessionPolicy {
    tracker: ContextTracker,
    engine: PolicyEngine,
}

impl SessionPolicy {
    pub fn new(max_context_limit: u64, session_expiry_hours: i64) -> Self {
        Self {
            tracker: ContextTracker::new(max_context_limit),
            engine: PolicyEngine::new(max_context_limit, session_expiry_hours),
        }
    }

    /// Refuses admission before any agent call is made when the estimate
    /// would push the session over its cap, or when the session itself has
    /// passed the policy-side expiry window.
    pub fn check_admission(
        &self,
        session_id: &str,
        created_at: DateTime<Utc>,
        estimated_tokens: u64,
    ) -> Result<LimitCheck, ServerError> {
        if self.engine.is_expired(created_at) {
            return Err(ServerError::SessionNotFound(session_id.to_string()));
        }

        let check = self.tracker.check_limit(session_id, estimated_tokens);
        if check.would_exceed {
            return Err(ServerError::TokenLimitExceeded {
                current: check.current_usage,
                max: check.max_limit,
                requested: estimated_tokens,
            });
        }
        Ok(check)
    }

    pub fn track_usage(&self, session_id: &str, agent_type: &str, tokens: u64) {
        self.tracker.track_usage(session_id, agent_type, tokens);
    }

    pub fn total_usage(&self, session_id: &str) -> u64 {
        self.tracker.get_total_usage(session_id)
    }

    pub fn reset(&self, session_id: &str) {
        self.tracker.reset(session_id);
    }

    pub fn max_tokens_per_session(&self) -> u64 {
        self.engine.max_tokens_per_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_refused_at_exact_boundary() {
        let policy = SessionPolicy::new(20_000, 24);
        policy.track_usage("s1", "nutrition", 19_500);
        let err = policy.check_admission("s1", Utc::now(), 600).unwrap_err();
        match err {
            ServerError::TokenLimitExceeded { current, max, requested } => {
                assert_eq!(current, 19_500);
                assert_eq!(max, 20_000);
                assert_eq!(requested, 600);
            }
            other => panic!("expected TokenLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn admission_allowed_one_below_limit() {
        let policy = SessionPolicy::new(20_000, 24);
        policy.track_usage("s1", "nutrition", 19_999);
        assert!(policy.check_admission("s1", Utc::now(), 1).is_ok());
    }

    #[test]
    fn admission_refused_at_limit_with_estimate_one() {
        let policy = SessionPolicy::new(20_000, 24);
        policy.track_usage("s1", "nutrition", 20_000);
        assert!(policy.check_admission("s1", Utc::now(), 1).is_err());
    }

    #[test]
    fn expired_session_refused_regardless_of_usage() {
        let policy = SessionPolicy::new(20_000, 24);
        let created_at = Utc::now() - ChronoDuration::hours(25);
        assert!(matches!(
            policy.check_admission("s1", created_at, 0),
            Err(ServerError::SessionNotFound(_))
        ));
    }
}
