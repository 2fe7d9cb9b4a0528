//! Configuration management for the CKD agent core.
//!
//! Supports loading configuration from:
//! - TOML files (`config/default.toml`, `config/{environment}.toml`)
//! - Environment variables (`CKD__` prefix, double-underscore nested)
//! - Runtime overrides via `Settings` defaults

pub mod settings;

pub use settings::{
    load_settings, LlmConfig, ObservabilityConfig, PersistenceConfig, PolicyConfig, RagConfig,
    RemoteAgentConfig, RemoteAgentsConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
