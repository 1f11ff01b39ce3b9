//! Error type for the threat-detection subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreatError {
    #[error("alert {0} not found")]
    AlertNotFound(String),
}

pub type ThreatResult<T> = Result<T, ThreatError>;
