//! Server-layer error taxonomy: session/policy failures that originate in
//! this crate, plus conversions from every downstream crate's error type so
//! handlers can propagate with `?` through one type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

use ckd_agent::AgentError;
use ckd_core::CoreError;
use ckd_persistence::PersistenceError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session creation not allowed: {0}")]
    CreationNotAllowed(String),

    #[error("token limit exceeded: current={current}, max={max}, requested={requested}")]
    TokenLimitExceeded { current: u64, max: u64, requested: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::CreationNotAllowed(_) => StatusCode::FORBIDDEN,
            ServerError::TokenLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Agent(AgentError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Agent(AgentError::CircuitOpen(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Agent(AgentError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Agent(_) => StatusCode::BAD_GATEWAY,
            ServerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ServerError::SessionNotFound(_) => "session_not_found",
            ServerError::CreationNotAllowed(_) => "session_creation_not_allowed",
            ServerError::TokenLimitExceeded { .. } => "token_limit_exceeded",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Agent(AgentError::NotFound(_)) => "agent_not_found",
            ServerError::Agent(AgentError::CircuitOpen(_)) => "agent_circuit_open",
            ServerError::Agent(AgentError::Timeout { .. }) => "agent_timeout",
            ServerError::Agent(_) => "agent_execution_error",
            ServerError::Persistence(_) => "persistence_error",
            ServerError::Core(_) => "internal_error",
        }
    }
}

/// Every error response carries `status=error`, a user-facing message, and
/// the stable code in `metadata` — never a stack trace.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "status": "error",
            "answer": self.to_string(),
            "metadata": { "error_code": self.code() },
        }));
        (status, body).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
