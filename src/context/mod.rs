//! The Context Manager (C1): authenticated-subject lifecycle.
//!
//! Owns `SecurityContext`/`Session` state, runs the validator chain on creation, and
//! is the sole component allowed to suspend a user (terminating their sessions and
//! barring new ones) in response to a threat-detector escalation.

mod error;
mod manager;
mod types;
mod validators;

pub use error::{ContextError, ContextResult};
pub use manager::{expires_at_or, ContextCallback, ContextManager, ContextManagerConfig};
pub use types::{SecurityContext, SecurityLevel, Session, SessionStatus};
pub use validators::{
    ContextValidator, ExpirationValidator, PermissionFormatValidator, RequiredFieldsValidator,
    SecurityLevelConsistencyValidator, ValidationResult, ValidatorChain,
};
