//! Error taxonomy shared by the store, query engine, and resilience layer.
//!
//! Not-found conditions are deliberately absent: schema and endpoint misses
//! are structured results (see [`crate::query`]), not errors.

use thiserror::Error;

/// Main error type for API Atlas operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AtlasError {
    /// Malformed or contradictory input. Surfaced immediately, never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The decoded document is not a usable OpenAPI/Swagger object.
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    /// A unique key was violated while ingesting a row.
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    /// Storage failed in a way that may succeed on a later attempt
    /// (busy database, pool exhaustion, I/O hiccup).
    #[error("transient storage error: {0}")]
    TransientStorage(String),

    /// Storage failed permanently.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("{operation} timed out after {elapsed_ms}ms ({retries} retries)")]
    Timeout {
        operation: String,
        elapsed_ms: u64,
        retries: u32,
    },

    #[error("{operation} rejected: circuit open, retry after {retry_after_ms}ms")]
    CircuitOpen {
        operation: String,
        retry_after_ms: u64,
    },

    #[error("{operation} failed after {retries} retries in {elapsed_ms}ms: {last_error}")]
    RetriesExhausted {
        operation: String,
        elapsed_ms: u64,
        retries: u32,
        last_error: String,
    },
}

impl AtlasError {
    /// Whether the resilience layer may retry the failed attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AtlasError::TransientStorage(_))
    }

    /// Whether the failure should count against a circuit breaker.
    ///
    /// Caller mistakes say nothing about backend health.
    pub fn is_backend_failure(&self) -> bool {
        !matches!(
            self,
            AtlasError::Validation(_) | AtlasError::InvalidSpec(_) | AtlasError::DuplicateEntity(_)
        )
    }

    /// Machine-readable code used by the tool adapter.
    pub fn code(&self) -> &'static str {
        match self {
            AtlasError::Validation(_) => "validation_error",
            AtlasError::InvalidSpec(_) => "invalid_spec",
            AtlasError::DuplicateEntity(_) => "duplicate_entity",
            AtlasError::TransientStorage(_) => "transient_storage_error",
            AtlasError::Storage(_) => "storage_error",
            AtlasError::Timeout { .. } => "timeout",
            AtlasError::CircuitOpen { .. } => "circuit_open",
            AtlasError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(err: serde_json::Error) -> Self {
        AtlasError::Storage(format!("corrupt JSON column: {}", err))
    }
}

/// Result type alias for API Atlas core operations.
pub type Result<T> = std::result::Result<T, AtlasError>;
