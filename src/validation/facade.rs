//! The orchestrating entry point: runs the staged validators, verdicts the
//! result, and routes every finding through the auditor.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::audit::{AuditLogger, AuditSeverity};

use super::auditor::{SecurityAlert, SecurityAuditor};
use super::business::{BusinessLogicConfig, BusinessLogicValidator};
use super::input::{self, DEFAULT_MAX_STRING_BYTES};
use super::output::{self, DEFAULT_MAX_OUTPUT_BYTES};
use super::types::{SecurityViolation, ValidationContext, ValidationLevel, Verdict};

/// Tunables for the whole validator; the size ceilings and rate limits that
/// feed the individual stages.
#[derive(Debug, Clone)]
pub struct SecurityValidatorConfig {
    pub level: ValidationLevel,
    pub max_input_bytes: usize,
    pub max_output_bytes: usize,
    pub business_logic: BusinessLogicConfig,
}

impl Default for SecurityValidatorConfig {
    fn default() -> Self {
        Self {
            level: ValidationLevel::Standard,
            max_input_bytes: DEFAULT_MAX_STRING_BYTES,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            business_logic: BusinessLogicConfig::default(),
        }
    }
}

/// The outcome of a `validate_request`/`validate_output` call.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub verdict: Verdict,
    pub passed: bool,
    pub violations: Vec<SecurityViolation>,
    pub alerts: Vec<SecurityAlert>,
}

/// Detects malicious or invalid payloads across input, business-logic, and
/// output stages, and feeds every finding to a [`SecurityAuditor`].
pub struct SecurityValidator {
    config: SecurityValidatorConfig,
    business_logic: BusinessLogicValidator,
    auditor: SecurityAuditor,
    audit: Option<Arc<AuditLogger>>,
}

impl SecurityValidator {
    pub fn new(config: SecurityValidatorConfig, audit: Option<Arc<AuditLogger>>) -> Self {
        let business_logic = BusinessLogicValidator::new(config.business_logic.clone());
        Self {
            config,
            business_logic,
            auditor: SecurityAuditor::new(),
            audit,
        }
    }

    /// Runs input and business-logic validation over an inbound payload.
    /// `passed` is false when any finding is `High`/`Critical` severity
    /// (i.e. the fold would reach [`Verdict::Malicious`]) or the payload was
    /// structurally malformed.
    pub async fn validate_request(
        &self,
        data: &JsonValue,
        context: &ValidationContext,
    ) -> ValidationOutcome {
        let mut violations = input::validate_input(data, context, self.config.max_input_bytes);
        violations.extend(self.business_logic.validate(context));
        self.finish(violations).await
    }

    /// Runs output validation over an outbound payload.
    pub async fn validate_output(
        &self,
        data: &JsonValue,
        context: &ValidationContext,
    ) -> ValidationOutcome {
        let violations = output::validate_output(data, context, self.config.max_output_bytes);
        self.finish(violations).await
    }

    async fn finish(&self, violations: Vec<SecurityViolation>) -> ValidationOutcome {
        let mut verdict = Verdict::Valid;
        let mut alerts = Vec::new();
        for violation in &violations {
            verdict = verdict.fold(violation.severity);
            alerts.extend(self.auditor.record(violation));
            self.audit_violation(violation).await;
        }
        for alert in &alerts {
            self.audit_alert(alert).await;
        }
        let passed = if self.config.level == ValidationLevel::Paranoid {
            verdict == Verdict::Valid
        } else {
            verdict < Verdict::Malicious
        };
        ValidationOutcome {
            verdict,
            passed,
            violations,
            alerts,
        }
    }

    async fn audit_violation(&self, violation: &SecurityViolation) {
        let Some(audit) = &self.audit else { return };
        let _ = audit
            .log_security_event(
                violation.message.clone(),
                violation.severity,
                violation.user_id.clone(),
                violation.session_id.clone(),
            )
            .await;
    }

    async fn audit_alert(&self, alert: &SecurityAlert) {
        let Some(audit) = &self.audit else { return };
        let _ = audit
            .log_security_event(
                alert.reason.clone(),
                AuditSeverity::High.max(alert.severity),
                alert.user_id.clone(),
                None,
            )
            .await;
    }

    pub fn record_failed_attempt(&self, user_id: &str) {
        self.business_logic.record_failed_attempt(user_id);
    }

    pub fn user_risk_score(&self, user_id: &str) -> f64 {
        self.auditor.user_risk_score(user_id)
    }

    pub fn prune_stale_state(&self) {
        self.business_logic.prune_stale();
    }

    pub fn violation_summary(&self, window: chrono::Duration) -> Vec<SecurityViolation> {
        self.auditor.violation_summary(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn clean_request_passes() {
        let validator = SecurityValidator::new(SecurityValidatorConfig::default(), None);
        let ctx = ValidationContext::new().with_user("alice").with_session("s1");
        let outcome = validator.validate_request(&json!({"name": "alice"}), &ctx).await;
        assert!(outcome.passed);
        assert_eq!(outcome.verdict, Verdict::Valid);
    }

    #[tokio::test]
    async fn sql_injection_fails_request() {
        let validator = SecurityValidator::new(SecurityValidatorConfig::default(), None);
        let ctx = ValidationContext::new();
        let outcome = validator
            .validate_request(&json!({"q": "1 OR 1=1; DROP TABLE users; --"}), &ctx)
            .await;
        assert!(!outcome.passed);
        assert_eq!(outcome.verdict, Verdict::Malicious);
    }

    #[tokio::test]
    async fn sensitive_output_is_flagged_but_not_failed_by_default() {
        let validator = SecurityValidator::new(SecurityValidatorConfig::default(), None);
        let ctx = ValidationContext::new();
        let outcome = validator
            .validate_output(&json!({"email": "alice@example.com"}), &ctx)
            .await;
        assert!(!outcome.violations.is_empty());
    }

    #[tokio::test]
    async fn paranoid_level_fails_on_any_suspicious_finding() {
        let mut config = SecurityValidatorConfig::default();
        config.level = ValidationLevel::Paranoid;
        let validator = SecurityValidator::new(config, None);
        let ctx = ValidationContext::new().with_user("alice");
        let outcome = validator.validate_request(&json!({"name": "alice"}), &ctx).await;
        assert!(!outcome.passed);
    }
}
