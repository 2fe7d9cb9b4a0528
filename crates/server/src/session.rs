//! In-memory session hot path: creation, idle/absolute eviction, and
//! conversation history bookkeeping.
//!
//! `ckd_core::Session` defines the shape; this module owns the mutable
//! machinery around it and is the only place that mutates a session's
//! `conversation_history` or `last_activity`. Durable mirroring to
//! `ckd-persistence` happens after each completed request, not here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;
use uuid::Uuid;

use ckd_core::{ConversationEntry, Session};

use crate::error::{ServerError, ServerResult};

/// One live session guarded by its own lock, so concurrent requests against
/// different sessions never contend on a single global mutex.
pub struct SessionHandle {
    inner: RwLock<Session>,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self { inner: RwLock::new(session) }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.read().clone()
    }

    pub fn active_agent(&self) -> Option<String> {
        self.inner.read().active_agent.clone()
    }
}

/// Owns every live session, enforcing the dual idle/absolute timeout model:
/// idle eviction purges `conversation_history` but keeps the session valid;
/// absolute eviction removes the session entirely.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    session_timeout: ChronoDuration,
    idle_timeout: ChronoDuration,
    _shutdown_tx: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(session_timeout_minutes: i64, idle_timeout_minutes: i64) -> Arc<Self> {
        let (tx, _rx) = watch::channel(false);
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            session_timeout: ChronoDuration::minutes(session_timeout_minutes),
            idle_timeout: ChronoDuration::minutes(idle_timeout_minutes),
            _shutdown_tx: tx,
        })
    }

    /// Spawns the background sweep that removes sessions past their
    /// absolute lifetime, mirroring `PolicyEngine`'s expiry GC.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: std::time::Duration) {
        let manager = self.clone();
        let mut shutdown_rx = self._shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.sweep_expired(),
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, handle| {
            let session = handle.inner.read();
            now.signed_duration_since(session.created_at) <= self.session_timeout
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, "expired sessions swept");
        }
    }

    pub fn create_session(&self, user_id: Option<String>, room_id: Option<String>) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(session_id.clone(), user_id, room_id);
        self.sessions.write().insert(session_id.clone(), Arc::new(SessionHandle::new(session)));
        session_id
    }

    /// Returns the session, applying idle eviction (history purge) and
    /// absolute eviction (session removal) first. `check_idle=false` skips
    /// the idle sweep for this call (used by admission checks that only
    /// need to confirm existence).
    pub fn get_session(&self, session_id: &str, check_idle: bool) -> ServerResult<Arc<SessionHandle>> {
        let handle = {
            let sessions = self.sessions.read();
            sessions.get(session_id).cloned()
        };
        let Some(handle) = handle else {
            return Err(ServerError::SessionNotFound(session_id.to_string()));
        };

        let now = Utc::now();
        {
            let mut session = handle.inner.write();
            if now.signed_duration_since(session.created_at) > self.session_timeout {
                drop(session);
                self.sessions.write().remove(session_id);
                return Err(ServerError::SessionNotFound(session_id.to_string()));
            }

            if check_idle && now.signed_duration_since(session.last_activity) > self.idle_timeout {
                tracing::debug!(session_id, "idle timeout reached, purging history");
                session.conversation_history.clear();
                session.last_activity = now;
            }
        }

        Ok(handle)
    }

    pub fn update_session_activity(&self, session_id: &str, agent_type: Option<&str>) -> ServerResult<()> {
        let handle = self.get_session(session_id, false)?;
        let mut session = handle.inner.write();
        session.last_activity = Utc::now();
        if let Some(agent_type) = agent_type {
            session.active_agent = Some(agent_type.to_string());
        }
        Ok(())
    }

    pub fn clear_history(&self, session_id: &str) -> ServerResult<()> {
        let handle = self.get_session(session_id, false)?;
        handle.inner.write().conversation_history.clear();
        Ok(())
    }

    pub fn add_to_history(
        &self,
        session_id: &str,
        agent_type: &str,
        user_input: &str,
        agent_response: &str,
    ) -> ServerResult<()> {
        let handle = self.get_session(session_id, false)?;
        let mut session = handle.inner.write();
        session.conversation_history.push(ConversationEntry {
            timestamp: Utc::now(),
            agent_type: agent_type.to_string(),
            user_input: user_input.to_string(),
            agent_response: agent_response.to_string(),
        });
        session.last_activity = Utc::now();
        Ok(())
    }

    pub fn get_conversation_history(&self, session_id: &str, limit: Option<usize>) -> ServerResult<Vec<ConversationEntry>> {
        let handle = self.get_session(session_id, true)?;
        let session = handle.inner.read();
        let history = &session.conversation_history;
        let start = limit.map(|l| history.len().saturating_sub(l)).unwrap_or(0);
        Ok(history[start..].to_vec())
    }

    pub fn get_conversation_history_by_agent(
        &self,
        session_id: &str,
        agent_type: &str,
        limit: Option<usize>,
    ) -> ServerResult<Vec<ConversationEntry>> {
        let entries = self.get_conversation_history(session_id, None)?;
        let mut filtered: Vec<ConversationEntry> =
            entries.into_iter().filter(|e| e.agent_type == agent_type).collect();
        if let Some(limit) = limit {
            let start = filtered.len().saturating_sub(limit);
            filtered = filtered.split_off(start);
        }
        Ok(filtered)
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_session_round_trips() {
        let manager = SessionManager::new(30, 10);
        let id = manager.create_session(Some("user-1".to_string()), None);
        let handle = manager.get_session(&id, true).unwrap();
        assert_eq!(handle.snapshot().session_id, id);
    }

    #[test]
    fn unknown_session_errors() {
        let manager = SessionManager::new(30, 10);
        assert!(matches!(manager.get_session("missing", true), Err(ServerError::SessionNotFound(_))));
    }

    #[test]
    fn idle_eviction_purges_history_but_keeps_session() {
        let manager = SessionManager::new(30, 10);
        let id = manager.create_session(None, None);
        manager.add_to_history(&id, "nutrition", "hi", "hello").unwrap();

        {
            let handle = manager.get_session(&id, false).unwrap();
            let mut session = handle.inner.write();
            session.last_activity = Utc::now() - ChronoDuration::minutes(11);
            session.created_at = Utc::now() - ChronoDuration::minutes(15);
        }

        let handle = manager.get_session(&id, true).unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.session_id, id);
        assert!(snapshot.conversation_history.is_empty());
    }

    #[test]
    fn absolute_timeout_removes_session() {
        let manager = SessionManager::new(30, 10);
        let id = manager.create_session(None, None);

        {
            let handle = manager.get_session(&id, false).unwrap();
            let mut session = handle.inner.write();
            session.created_at = Utc::now() - ChronoDuration::minutes(31);
        }

        assert!(matches!(manager.get_session(&id, true), Err(ServerError::SessionNotFound(_))));
    }

    #[test]
    fn history_append_only_across_observations() {
        let manager = SessionManager::new(30, 10);
        let id = manager.create_session(None, None);
        manager.add_to_history(&id, "nutrition", "q1", "a1").unwrap();
        let first = manager.get_conversation_history(&id, None).unwrap();
        manager.add_to_history(&id, "nutrition", "q2", "a2").unwrap();
        let second = manager.get_conversation_history(&id, None).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].user_input, first[0].user_input);
    }
}
