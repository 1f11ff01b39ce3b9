//! The Security Validator (C3): input/business-logic/output checks plus the
//! auditor that tracks findings and scores per-user risk.
//!
//! ```no_run
//! # use security_core::validation::{SecurityValidator, SecurityValidatorConfig, ValidationContext};
//! # async fn run(validator: SecurityValidator) {
//! let ctx = ValidationContext::new().with_user("alice").with_session("s1");
//! let outcome = validator.validate_request(&serde_json::json!({"q": "hello"}), &ctx).await;
//! assert!(outcome.passed);
//! # }
//! ```

mod auditor;
mod business;
mod error;
mod facade;
mod input;
mod output;
mod types;

pub use auditor::{SecurityAlert, SecurityAuditor};
pub use business::{BusinessLogicConfig, BusinessLogicValidator};
pub use error::{ValidationError, ValidationOutcomeResult};
pub use facade::{SecurityValidator, SecurityValidatorConfig, ValidationOutcome};
pub use input::validate_input;
pub use output::validate_output;
pub use types::{
    SecurityViolation, ThreatType, ValidationContext, ValidationLevel, Verdict,
};
