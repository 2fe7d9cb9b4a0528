//! Persistence-layer error taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("ScyllaDB connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<PersistenceError> for ckd_core::CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Connection(msg) => ckd_core::CoreError::DatabaseConnection(msg),
            other => ckd_core::CoreError::Other(other.to_string()),
        }
    }
}
