//! Error type for the Context Manager.

use thiserror::Error;

/// Errors surfaced by context-creation and validation.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A validator in the default or custom chain rejected the context.
    #[error("context validation failed: {0}")]
    Validation(String),

    /// `create_context` was called for a user currently in the suspended set.
    #[error("user '{0}' is suspended")]
    UserSuspended(String),

    /// The referenced session does not exist (or has already expired and been evicted).
    #[error("session '{0}' not found")]
    SessionNotFound(String),
}

/// Convenience alias for fallible context operations.
pub type ContextResult<T> = Result<T, ContextError>;
