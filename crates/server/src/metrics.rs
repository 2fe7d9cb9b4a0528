//! Prometheus metrics: request counts, latency, and per-agent token usage.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static RECORDER: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Installs the process-global Prometheus recorder. Call once at startup;
/// later calls are no-ops and return the handle installed by the first.
pub fn init_metrics() -> PrometheusHandle {
    RECORDER
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

pub async fn metrics_handler() -> String {
    match RECORDER.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

pub fn record_request(agent_type: &str, status: &str) {
    metrics::counter!("ckd_requests_total", "agent_type" => agent_type.to_string(), "status" => status.to_string())
        .increment(1);
}

pub fn record_latency(agent_type: &str, duration: std::time::Duration) {
    metrics::histogram!("ckd_request_duration_seconds", "agent_type" => agent_type.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_tokens(agent_type: &str, tokens: u64) {
    metrics::counter!("ckd_tokens_total", "agent_type" => agent_type.to_string()).increment(tokens);
}
