//! Background health supervision for the retrieval engine's storage
//! backends (Qdrant and the Tantivy indices).
//!
//! Checks happen at most once per `interval`, and a failed check retries
//! reconnection up to `max_attempts` times with linear backoff before
//! giving up for this cycle and surfacing the failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::vector_store::VectorStore;

pub struct HealthSupervisor {
    vector_store: Arc<VectorStore>,
    interval: Duration,
    max_attempts: u32,
    healthy: Arc<AtomicBool>,
}

impl HealthSupervisor {
    pub fn new(vector_store: Arc<VectorStore>, interval_secs: u64, max_attempts: u32) -> Self {
        Self {
            vector_store,
            interval: Duration::from_secs(interval_secs.max(1)),
            max_attempts: max_attempts.max(1),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Runs the supervision loop until cancelled. Intended to be spawned
    /// once per process via `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        loop {
            sleep(self.interval).await;
            self.check_once().await;
        }
    }

    async fn check_once(&self) {
        for attempt in 1..=self.max_attempts {
            match self.vector_store.health_check().await {
                Ok(()) => {
                    self.healthy.store(true, Ordering::Relaxed);
                    return;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "vector store health check failed");
                    if attempt < self.max_attempts {
                        sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    }
                }
            }
        }
        self.healthy.store(false, Ordering::Relaxed);
        tracing::error!("vector store unreachable after retries, marking unhealthy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        // Construction alone shouldn't require a live connection.
        let healthy = Arc::new(AtomicBool::new(true));
        assert!(healthy.load(Ordering::Relaxed));
    }
}
