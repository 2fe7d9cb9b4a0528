//! Application state shared across all handlers.

use std::sync::Arc;

use parking_lot::RwLock;

use ckd_agent::{AgentRegistry, RouterAgent};
use ckd_config::Settings;
use ckd_core::LanguageModel;
use ckd_persistence::PersistenceLayer;
use ckd_rag::HybridEngine;

use crate::policy::SessionPolicy;
use crate::session::SessionManager;
use crate::streams::StreamRegistry;

/// Everything a handler needs, cloned cheaply (every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub sessions: Arc<SessionManager>,
    pub policy: Arc<SessionPolicy>,
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<RouterAgent>,
    pub streams: Arc<StreamRegistry>,
    /// `None` when RAG retrieval is disabled in config; health checks and
    /// readiness reporting treat that as an expected degraded mode, not
    /// a failure.
    pub rag: Option<Arc<HybridEngine>>,
    pub llm: Arc<dyn LanguageModel>,
    /// `None` when ScyllaDB persistence is disabled; sessions then live
    /// only in the in-memory `SessionManager` for the life of the process.
    pub persistence: Option<Arc<PersistenceLayer>>,
}

impl AppState {
    pub fn new(
        config: Settings,
        registry: Arc<AgentRegistry>,
        router: Arc<RouterAgent>,
        llm: Arc<dyn LanguageModel>,
        rag: Option<Arc<HybridEngine>>,
        persistence: Option<Arc<PersistenceLayer>>,
    ) -> Self {
        let policy_config = &config.policy;
        let sessions = SessionManager::new(
            policy_config.session_timeout_minutes as i64,
            policy_config.idle_timeout_minutes as i64,
        );
        sessions.start_cleanup_task(std::time::Duration::from_secs(60));

        let policy = Arc::new(SessionPolicy::new(
            policy_config.max_context_limit,
            policy_config.session_expiry_hours as i64,
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            sessions,
            policy,
            registry,
            router,
            streams: Arc::new(StreamRegistry::new()),
            rag,
            llm,
            persistence,
        }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    pub fn is_persistence_enabled(&self) -> bool {
        self.persistence.is_some()
    }

    pub fn is_rag_enabled(&self) -> bool {
        self.rag.is_some()
    }
}
