//! Streaming cancellation registry.
//!
//! One entry per in-flight streaming request. A control endpoint flips
//! `cancel_requested`; the streaming loop observes it between chunks and
//! emits a final `cancelled` chunk instead of continuing. This is the only
//! supported cancellation mechanism — no thread-abort semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

pub struct StreamHandle {
    cancel_requested: AtomicBool,
    pub partial_response: RwLock<String>,
    pub started_at: DateTime<Utc>,
}

impl StreamHandle {
    fn new() -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            partial_response: RwLock::new(String::new()),
            started_at: Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn append(&self, chunk: &str) {
        self.partial_response.write().push_str(chunk);
    }
}

#[derive(Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, Arc<StreamHandle>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, session_id: &str) -> Arc<StreamHandle> {
        let handle = Arc::new(StreamHandle::new());
        self.streams.write().insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Called by the streaming endpoint's terminal branch (completion,
    /// client disconnect, or cancellation) to drop the registry entry.
    pub fn finish(&self, session_id: &str) {
        self.streams.write().remove(session_id);
    }

    pub fn request_cancel(&self, session_id: &str) -> bool {
        match self.streams.read().get(session_id) {
            Some(handle) => {
                handle.cancel_requested.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.streams.read().contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_observed_after_request_cancel() {
        let registry = StreamRegistry::new();
        let handle = registry.start("s1");
        assert!(!handle.is_cancelled());

        assert!(registry.request_cancel("s1"));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancel_unknown_session_reports_not_found() {
        let registry = StreamRegistry::new();
        assert!(!registry.request_cancel("missing"));
    }

    #[test]
    fn finish_removes_from_registry() {
        let registry = StreamRegistry::new();
        registry.start("s1");
        assert!(registry.is_active("s1"));
        registry.finish("s1");
        assert!(!registry.is_active("s1"));
    }
}
