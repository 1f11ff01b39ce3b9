//! Error type for stages that fail outright rather than returning a decision.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("{0}")]
    Failed(String),
}
