//! Crate-root error type converging every component's error into one enum,
//! following the teacher's `OSError` pattern: `thiserror`-derived variants
//! plus constructor helpers and `is_retryable`/`category` classifiers.

use thiserror::Error;

use crate::audit::AuditError;
use crate::context::ContextError;
use crate::middleware_chain::MiddlewareError;
use crate::permissions::PermissionError;
use crate::sandbox::SandboxError;
use crate::threat::ThreatError;
use crate::validation::ValidationError;

/// Result type alias for operations that surface a [`SecurityCoreError`].
pub type SecurityCoreResult<T> = Result<T, SecurityCoreError>;

/// Coarse category used for metrics and logging grouping, independent of the
/// specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Context,
    Permission,
    Validation,
    Threat,
    Sandbox,
    Audit,
    Middleware,
    Internal,
}

#[derive(Debug, Error)]
pub enum SecurityCoreError {
    /// Invalid context creation; surfaced to the caller.
    #[error("context validation failed: {0}")]
    ContextValidation(#[from] ContextError),

    /// Authorization failure; surfaced to the caller, always audited.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// Permission engine catalog or evaluation error.
    #[error("permission engine error: {0}")]
    Permission(#[from] PermissionError),

    /// Validator found a critical issue; surfaced to the caller, always audited.
    #[error("security violation: {reason}")]
    SecurityViolation { reason: String },

    /// Structural validator error (malformed input outside the finding model).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Sandbox spawn/monitor infrastructure failure.
    #[error("sandbox failure: {0}")]
    Sandbox(#[from] SandboxError),

    /// Threat-detector bookkeeping error (e.g. unknown alert id).
    #[error("threat detector error: {0}")]
    Threat(#[from] ThreatError),

    /// Audit backend write failed. Recovered locally; never meant to reach a
    /// request path, but convertible for completeness.
    #[error("audit storage failure: {0}")]
    Storage(#[from] AuditError),

    /// A middleware stage failed outright rather than returning a decision.
    #[error("middleware error: {0}")]
    Middleware(#[from] MiddlewareError),

    /// Unexpected internal error; caught at the boundary and converted to a
    /// DENY result rather than propagated raw.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl SecurityCoreError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied { reason: reason.into() }
    }

    pub fn security_violation(reason: impl Into<String>) -> Self {
        Self::SecurityViolation { reason: reason.into() }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal { reason: reason.into() }
    }

    /// Whether a caller might reasonably retry the same request unchanged.
    /// Policy and validation failures will not resolve themselves; storage
    /// and internal errors might, once the underlying condition clears.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ContextValidation(_) => ErrorCategory::Context,
            Self::AccessDenied { .. } | Self::Permission(_) => ErrorCategory::Permission,
            Self::SecurityViolation { .. } | Self::Validation(_) => ErrorCategory::Validation,
            Self::Threat(_) => ErrorCategory::Threat,
            Self::Sandbox(_) => ErrorCategory::Sandbox,
            Self::Storage(_) => ErrorCategory::Audit,
            Self::Middleware(_) => ErrorCategory::Middleware,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}
