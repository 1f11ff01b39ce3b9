//! Default and custom validators run on context creation and on demand.

use chrono::Duration;

use super::types::{SecurityContext, SecurityLevel};

/// Outcome of running the validator chain: non-fatal issues are `warnings`, fatal
/// ones are `errors`. A context with any `errors` is rejected by the Context Manager.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// A single rule in the context-validation chain.
pub trait ContextValidator: Send + Sync {
    fn validate(&self, context: &SecurityContext) -> ValidationResult;

    fn name(&self) -> &str;
}

/// (a) non-empty `user_id`/`ip_address`; warn on empty `permissions`.
pub struct RequiredFieldsValidator;

impl ContextValidator for RequiredFieldsValidator {
    fn validate(&self, context: &SecurityContext) -> ValidationResult {
        let mut result = ValidationResult::default();
        if context.user_id.trim().is_empty() {
            result.errors.push("user_id must not be empty".to_string());
        }
        if context.ip_address.trim().is_empty() {
            result.errors.push("ip_address must not be empty".to_string());
        }
        if context.permissions.is_empty() {
            result
                .warnings
                .push("context was created with no permissions".to_string());
        }
        result
    }

    fn name(&self) -> &str {
        "required_fields"
    }
}

/// (b) each permission entry is a non-empty string.
pub struct PermissionFormatValidator;

impl ContextValidator for PermissionFormatValidator {
    fn validate(&self, context: &SecurityContext) -> ValidationResult {
        let mut result = ValidationResult::default();
        for permission in &context.permissions {
            if permission.trim().is_empty() {
                result
                    .errors
                    .push("permission names must not be empty".to_string());
            }
        }
        result
    }

    fn name(&self) -> &str {
        "permission_format"
    }
}

/// (c) `expires_at` not in the past; warn if more than 24h out.
pub struct ExpirationValidator;

impl ContextValidator for ExpirationValidator {
    fn validate(&self, context: &SecurityContext) -> ValidationResult {
        let mut result = ValidationResult::default();
        if let Some(expires_at) = context.expires_at {
            if expires_at <= context.created_at {
                result
                    .errors
                    .push("expires_at must be strictly after created_at".to_string());
            } else if expires_at - context.created_at > Duration::hours(24) {
                result
                    .warnings
                    .push("context expiration is more than 24 hours out".to_string());
            }
        }
        result
    }

    fn name(&self) -> &str {
        "expiration"
    }
}

/// (d) warn if CONFIDENTIAL without an administrative permission.
pub struct SecurityLevelConsistencyValidator;

impl ContextValidator for SecurityLevelConsistencyValidator {
    fn validate(&self, context: &SecurityContext) -> ValidationResult {
        let mut result = ValidationResult::default();
        if context.security_level == SecurityLevel::Confidential {
            let has_admin = context
                .permissions
                .iter()
                .any(|p| p.contains("admin") || p == "system_config");
            if !has_admin {
                result.warnings.push(
                    "confidential security level granted without an administrative permission"
                        .to_string(),
                );
            }
        }
        result
    }

    fn name(&self) -> &str {
        "security_level_consistency"
    }
}

/// Runs an ordered chain of validators and merges their results.
pub struct ValidatorChain {
    validators: Vec<Box<dyn ContextValidator>>,
}

impl ValidatorChain {
    /// The default chain: required-fields, permission-format, expiration, then
    /// security-level consistency, in that order.
    pub fn default_chain() -> Self {
        Self {
            validators: vec![
                Box::new(RequiredFieldsValidator),
                Box::new(PermissionFormatValidator),
                Box::new(ExpirationValidator),
                Box::new(SecurityLevelConsistencyValidator),
            ],
        }
    }

    pub fn push(&mut self, validator: Box<dyn ContextValidator>) {
        self.validators.push(validator);
    }

    pub fn validate(&self, context: &SecurityContext) -> ValidationResult {
        let mut result = ValidationResult::default();
        for validator in &self.validators {
            result.merge(validator.validate(context));
        }
        result
    }
}

impl Default for ValidatorChain {
    fn default() -> Self {
        Self::default_chain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_id_is_rejected() {
        let ctx = SecurityContext::new("", "127.0.0.1");
        let result = ValidatorChain::default_chain().validate(&ctx);
        assert!(!result.is_valid());
    }

    #[test]
    fn empty_permissions_only_warns() {
        let ctx = SecurityContext::new("alice", "127.0.0.1");
        let result = ValidatorChain::default_chain().validate(&ctx);
        assert!(result.is_valid());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn expiry_before_creation_is_an_error() {
        let mut ctx = SecurityContext::new("alice", "127.0.0.1");
        ctx.expires_at = Some(ctx.created_at - Duration::seconds(1));
        let result = ValidatorChain::default_chain().validate(&ctx);
        assert!(!result.is_valid());
    }

    #[test]
    fn confidential_without_admin_warns() {
        let ctx = SecurityContext::new("alice", "127.0.0.1")
            .with_security_level(SecurityLevel::Confidential);
        let result = ValidatorChain::default_chain().validate(&ctx);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("administrative")));
    }
}
