//! Error type for the sandbox subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to prepare sandbox workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("no environment registered under id {0}")]
    EnvironmentNotFound(String),

    #[error("isolation tier {0:?} is not available on this build")]
    TierUnavailable(super::types::SandboxTier),

    #[error("failed to spawn sandboxed process: {0}")]
    SpawnFailed(String),

    #[error("execution was blocked by a pre-execution security check: {0}")]
    PreCheckBlocked(String),

    #[error("sandbox worker task panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type SandboxResult<T> = Result<T, SandboxError>;
