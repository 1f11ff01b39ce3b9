//! Error type for audit log operations.

use thiserror::Error;

/// Errors produced by the audit pipeline.
///
/// Per the audit log's failure semantics, these never propagate to request-path
/// callers; they are absorbed locally (counted, and in the sustained-failure case,
/// emitted to the stderr fallback sink).
#[derive(Debug, Error)]
pub enum AuditError {
    /// I/O error while writing or rotating a log file.
    #[error("audit storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure serializing an event to its on-disk representation.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The audit pipeline was not started (or already stopped) when a call required it.
    #[error("audit log is not running")]
    NotRunning,

    /// The bounded event queue was full and the event's severity did not require blocking.
    #[error("audit queue full, event dropped")]
    QueueFull,

    /// Generic storage-backend failure with a human-readable reason.
    #[error("audit storage failure: {0}")]
    Storage(String),
}

/// Convenience alias for fallible audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
