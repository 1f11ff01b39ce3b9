//! Error type for the Permission Engine.

use thiserror::Error;

/// Errors surfaced by catalog mutation and condition evaluation.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("permission '{0}' already exists")]
    PermissionExists(String),

    #[error("permission '{0}' not found")]
    PermissionNotFound(String),

    #[error("role '{0}' already exists")]
    RoleExists(String),

    #[error("role '{0}' not found")]
    RoleNotFound(String),

    #[error("role '{0}' references unknown permissions: {1:?}")]
    UnknownPermissions(String, Vec<String>),

    #[error("role hierarchy cycle detected involving '{0}'")]
    RoleCycle(String),

    #[error("policy rule '{0}' already exists")]
    PolicyRuleExists(String),

    #[error("policy rule '{0}' not found")]
    PolicyRuleNotFound(String),

    #[error("condition syntax error: {0}")]
    ConditionSyntax(String),
}

/// Convenience alias for fallible permission-engine operations.
pub type PermissionResult<T> = Result<T, PermissionError>;
