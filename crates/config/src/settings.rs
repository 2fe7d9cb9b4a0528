//! Main settings module: file + environment layered configuration for the
//! CKD agent core.

use std::collections::HashMap;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment, gating how strictly [`Settings::validate`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Top-level settings, assembled by [`load_settings`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub remote_agents: RemoteAgentsConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

fn default_qdrant_endpoint() -> String {
    std::env::var("QDRANT_ENDPOINT").unwrap_or_else(|_| "http://localhost:6334".to_string())
}

fn default_tantivy_index_path() -> String {
    "./data/tantivy".to_string()
}

fn default_dense_top_k_factor() -> usize {
    3
}

fn default_fallback_factor() -> usize {
    2
}

fn default_alpha() -> f32 {
    0.4
}

fn default_beta() -> f32 {
    0.6
}

fn default_query_cache_size() -> usize {
    500
}

fn default_query_cache_ttl_secs() -> u64 {
    180
}

fn default_embedding_cache_size() -> usize {
    5000
}

fn default_embedding_cache_dir() -> String {
    "./data/embedding_cache".to_string()
}

fn default_health_check_interval_secs() -> u64 {
    60
}

fn default_health_check_max_attempts() -> u32 {
    3
}

/// Hybrid retrieval engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    #[serde(default = "default_tantivy_index_path")]
    pub tantivy_index_path: String,

    /// Semantic search fetches `dense_top_k_factor * limit` nearest vectors
    /// before hydration and post-filtering.
    #[serde(default = "default_dense_top_k_factor")]
    pub dense_top_k_factor: usize,

    /// Structured fallback scan returns up to `fallback_factor * limit`
    /// results.
    #[serde(default = "default_fallback_factor")]
    pub fallback_factor: usize,

    /// Keyword weight in the hybrid merge.
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    /// Semantic weight in the hybrid merge.
    #[serde(default = "default_beta")]
    pub beta: f32,

    #[serde(default = "default_query_cache_size")]
    pub query_cache_size: usize,

    #[serde(default = "default_query_cache_ttl_secs")]
    pub query_cache_ttl_secs: u64,

    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: usize,

    #[serde(default = "default_embedding_cache_dir")]
    pub embedding_cache_dir: String,

    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_health_check_max_attempts")]
    pub health_check_max_attempts: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_api_key: None,
            tantivy_index_path: default_tantivy_index_path(),
            dense_top_k_factor: default_dense_top_k_factor(),
            fallback_factor: default_fallback_factor(),
            alpha: default_alpha(),
            beta: default_beta(),
            query_cache_size: default_query_cache_size(),
            query_cache_ttl_secs: default_query_cache_ttl_secs(),
            embedding_cache_size: default_embedding_cache_size(),
            embedding_cache_dir: default_embedding_cache_dir(),
            health_check_interval_secs: default_health_check_interval_secs(),
            health_check_max_attempts: default_health_check_max_attempts(),
        }
    }
}

fn default_llm_endpoint() -> String {
    std::env::var("LLM_ENDPOINT").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

fn default_llm_model() -> String {
    "llama3.1".to_string()
}

fn default_classifier_max_tokens() -> u32 {
    512
}

fn default_synthesis_overhead_tokens() -> u32 {
    500
}

/// LLM backend configuration for the router's classifier and synthesis
/// calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_classifier_max_tokens")]
    pub classifier_max_tokens: u32,

    /// Fixed overhead added to the sum of per-agent token usage when the
    /// router synthesizes a multi-agent answer.
    #[serde(default = "default_synthesis_overhead_tokens")]
    pub synthesis_overhead_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            classifier_max_tokens: default_classifier_max_tokens(),
            synthesis_overhead_tokens: default_synthesis_overhead_tokens(),
        }
    }
}

fn default_max_context_limit() -> u64 {
    20_000
}

fn default_session_timeout_minutes() -> i64 {
    30
}

fn default_idle_timeout_minutes() -> i64 {
    10
}

fn default_session_expiry_hours() -> i64 {
    24
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_recovery_timeout_secs() -> u64 {
    60
}

/// Token/session limits and circuit-breaker thresholds — see DESIGN.md for
/// the ContextTracker/PolicyEngine consolidation decision this struct
/// reflects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Mirrors the original `MAX_CONTEXT_LIMIT` constant.
    #[serde(default = "default_max_context_limit")]
    pub max_context_limit: u64,

    /// `session_timeout` — absolute session lifetime.
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: i64,

    /// `idle_timeout` — history purge threshold.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,

    /// `SESSION_EXPIRY_HOURS` — absolute garbage-collection sweep window
    /// used by the policy-side expiry check.
    #[serde(default = "default_session_expiry_hours")]
    pub session_expiry_hours: i64,

    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    #[serde(default = "default_circuit_recovery_timeout_secs")]
    pub circuit_recovery_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_context_limit: default_max_context_limit(),
            session_timeout_minutes: default_session_timeout_minutes(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            session_expiry_hours: default_session_expiry_hours(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_recovery_timeout_secs: default_circuit_recovery_timeout_secs(),
        }
    }
}

fn default_remote_timeout_secs() -> f64 {
    30.0
}

fn default_remote_max_retries() -> u32 {
    3
}

fn default_remote_backoff_factor() -> f64 {
    2.0
}

fn default_remote_max_polling_duration_secs() -> f64 {
    120.0
}

fn default_remote_polling_interval_secs() -> f64 {
    0.5
}

fn default_remote_polling_interval_cap_secs() -> f64 {
    2.0
}

fn default_remote_jitter_ratio() -> f64 {
    0.25
}

/// Per-agent-type remote adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAgentConfig {
    pub host: String,
    pub port: u16,

    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: f64,

    #[serde(default = "default_remote_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_remote_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_remote_max_polling_duration_secs")]
    pub max_polling_duration_secs: f64,

    #[serde(default = "default_remote_polling_interval_secs")]
    pub polling_interval_secs: f64,

    #[serde(default = "default_remote_polling_interval_cap_secs")]
    pub polling_interval_cap_secs: f64,

    /// Jitter as a fraction of the computed backoff delay.
    #[serde(default = "default_remote_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl RemoteAgentConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteAgentsConfig {
    #[serde(flatten)]
    pub by_agent_type: HashMap<String, RemoteAgentConfig>,
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["127.0.0.1:9042".to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "ckd_agent".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

/// ScyllaDB persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Logging/tracing/metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub tracing_enabled: bool,

    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub metrics_enabled: bool,

    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            tracing_enabled: true,
            otlp_endpoint: None,
            metrics_enabled: false,
            metrics_port: None,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_rag()?;
        self.validate_policy()?;
        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        if (self.rag.alpha + self.rag.beta - 1.0).abs() > 1e-3 {
            tracing::warn!(
                alpha = self.rag.alpha,
                beta = self.rag.beta,
                "hybrid retrieval weights do not sum to 1.0"
            );
        }
        if self.rag.query_cache_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.query_cache_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn validate_policy(&self) -> Result<(), ConfigError> {
        if self.policy.idle_timeout_minutes >= self.policy.session_timeout_minutes {
            return Err(ConfigError::InvalidValue {
                field: "policy.idle_timeout_minutes".to_string(),
                message: "must be less than session_timeout_minutes".to_string(),
            });
        }
        if self.policy.max_context_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.max_context_limit".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings layered default -> environment file -> environment
/// variables (`CKD_` prefix), matching the teacher's `config`-crate
/// layering pattern.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CKD")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.policy.max_context_limit, 20_000);
    }

    #[test]
    fn test_policy_validation_rejects_idle_ge_session() {
        let mut settings = Settings::default();
        settings.policy.idle_timeout_minutes = 30;
        settings.policy.session_timeout_minutes = 30;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_remote_agent_base_url() {
        let cfg = RemoteAgentConfig {
            host: "parlant-nutrition".to_string(),
            port: 8800,
            timeout_secs: 30.0,
            max_retries: 3,
            backoff_factor: 2.0,
            max_polling_duration_secs: 120.0,
            polling_interval_secs: 0.5,
            polling_interval_cap_secs: 2.0,
            jitter_ratio: 0.25,
        };
        assert_eq!(cfg.base_url(), "http://parlant-nutrition:8800");
    }
}
