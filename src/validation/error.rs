//! Error type for the validation subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload exceeds the {limit} byte size ceiling ({actual} bytes)")]
    PayloadTooLarge { limit: usize, actual: usize },

    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type ValidationOutcomeResult<T> = Result<T, ValidationError>;
