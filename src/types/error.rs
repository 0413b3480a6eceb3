//! Error types for the translate-and-execute pipeline.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From`
//! implementations. Every failure is terminal for the single call that
//! produced it; nothing in this crate retries.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure taxonomy for statement location, payload evaluation, compilation,
/// and execution.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Neither a log-of-binding call nor an await-of-entrypoint declaration
    /// was found in the pasted source
    #[error("No active statement found in source text")]
    NoActiveStatement,

    /// The accumulated statement block contains no `entrypoint.model.action(`
    /// call
    #[error("No model.action call found in statement block")]
    MethodNotFound,

    /// A delimiter span never closed before the text ended
    #[error("Unbalanced span: {0}")]
    UnbalancedSpan(String),

    /// Model name absent from the schema registry
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Action name outside the supported set
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Payload text could not be evaluated and no fallback applies
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Update or delete target does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Driver-level connection or statement failure
    #[error("Connection error: {0}")]
    Connection(#[from] tokio_postgres::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema registry construction or validation failure
    #[error("Schema error: {0}")]
    Schema(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error (schema files)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a schema error with context.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a configuration error with context.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
