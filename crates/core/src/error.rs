//! Shared error type for infrastructure-level failures.
//!
//! Component-specific errors (registry, remote-agent, router, session) live
//! in their owning crates and typically wrap a [`CoreError`] as their
//! `#[source]` when the failure originates below the component boundary.

use thiserror::Error;

/// Infrastructure-layer error kinds shared by every crate in the workspace.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("external service '{service}' failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("cache failure: {0}")]
    Cache(String),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
