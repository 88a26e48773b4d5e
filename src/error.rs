//! Error taxonomy for the memory engine.
//!
//! Kinds, not types: every public operation fails with one of the seven
//! kinds below. Background workers swallow everything except `internal`
//! conditions that indicate corruption and keep ticking; client-facing
//! calls surface a single top-level error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CortexError>;

#[derive(Error, Debug)]
pub enum CortexError {
    /// Malformed input: empty title/content, unknown category, limit out of range.
    #[error("validation error: {0}")]
    Validation(String),

    /// No row with the given id.
    #[error("not found: {0}")]
    NotFound(i64),

    /// Control state forbids mutation while paused.
    #[error("engine is paused")]
    Paused,

    /// Database size hard-cap exceeded; write refused.
    #[error("over capacity: {0}")]
    OverCapacity(String),

    /// Database busy beyond the configured timeout.
    #[error("contention: {0}")]
    Contention(String),

    /// Embedding pipeline unavailable; caller proceeds FTS-only.
    #[error("degraded: {0}")]
    Degraded(String),

    /// A duplicate near-match was returned instead of inserting.
    #[error("duplicate memory detected (existing_id={existing_id})")]
    Duplicate { existing_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected; never crashes the process, always logged with context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CortexError {
    /// Whether a client may usefully retry the call as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CortexError::Contention(_))
    }

    /// MCP/JSON-RPC error code.
    pub fn code(&self) -> i64 {
        match self {
            CortexError::NotFound(_) => -32001,
            CortexError::Validation(_) => -32602,
            CortexError::Paused => -32002,
            CortexError::OverCapacity(_) => -32003,
            CortexError::Contention(_) => -32004,
            CortexError::Duplicate { .. } => -32005,
            CortexError::Degraded(_) => -32006,
            _ => -32000,
        }
    }

    /// Kind name, used in structured tool/API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            CortexError::Validation(_) => "validation",
            CortexError::NotFound(_) => "not_found",
            CortexError::Paused => "paused",
            CortexError::OverCapacity(_) => "over_capacity",
            CortexError::Contention(_) => "contention",
            CortexError::Degraded(_) => "degraded",
            CortexError::Duplicate { .. } => "duplicate",
            _ => "internal",
        }
    }
}
