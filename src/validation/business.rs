//! Business-logic validation: stateful rules tied to the calling subject
//! rather than to payload content.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::audit::AuditSeverity;

use super::types::{SecurityViolation, ThreatType, ValidationContext};

/// Tunables for the stateful checks; defaults mirror the values a reference
/// deployment of this validator ships with.
#[derive(Debug, Clone)]
pub struct BusinessLogicConfig {
    pub rate_limit_per_minute: usize,
    pub failed_attempt_limit: usize,
    pub failed_attempt_window: Duration,
    pub replay_window: Duration,
}

impl Default for BusinessLogicConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 100,
            failed_attempt_limit: 5,
            failed_attempt_window: Duration::minutes(15),
            replay_window: Duration::seconds(300),
        }
    }
}

/// Sliding-window counters keyed by IP (for rate limiting) and by user (for
/// failed-attempt tracking). Bounded by periodic pruning on access rather than
/// a fixed capacity, since both keyspaces are naturally small relative to
/// traffic volume.
pub struct BusinessLogicValidator {
    config: BusinessLogicConfig,
    requests_by_ip: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    failures_by_user: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl BusinessLogicValidator {
    pub fn new(config: BusinessLogicConfig) -> Self {
        Self {
            config,
            requests_by_ip: Mutex::new(HashMap::new()),
            failures_by_user: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failed authentication/authorization attempt for `user_id`.
    /// Does not itself raise a violation; the next [`Self::validate`] call for
    /// that user will see it reflected in the brute-force window.
    pub fn record_failed_attempt(&self, user_id: &str) {
        let now = Utc::now();
        let mut failures = self.failures_by_user.lock();
        let window = failures.entry(user_id.to_string()).or_default();
        window.push_back(now);
        prune(window, now, self.config.failed_attempt_window);
    }

    pub fn validate(&self, context: &ValidationContext) -> Vec<SecurityViolation> {
        let mut violations = Vec::new();
        let now = context.effective_timestamp();

        if let Some(ip) = &context.ip_address {
            let mut requests = self.requests_by_ip.lock();
            let window = requests.entry(ip.clone()).or_default();
            window.push_back(now);
            prune(window, now, Duration::minutes(1));
            if window.len() > self.config.rate_limit_per_minute {
                violations.push(
                    annotate(
                        SecurityViolation::new(
                            ThreatType::DenialOfService,
                            AuditSeverity::Medium,
                            format!(
                                "{} requests from {ip} in the last minute exceeds the {} cap",
                                window.len(),
                                self.config.rate_limit_per_minute
                            ),
                            "business_logic_validator.rate_limit",
                        ),
                        context,
                    ),
                );
            }
        }

        if let Some(user_id) = &context.user_id {
            let mut failures = self.failures_by_user.lock();
            if let Some(window) = failures.get_mut(user_id) {
                prune(window, now, self.config.failed_attempt_window);
                if window.len() >= self.config.failed_attempt_limit {
                    violations.push(
                        annotate(
                            SecurityViolation::new(
                                ThreatType::BruteForceAttack,
                                AuditSeverity::High,
                                format!(
                                    "{} failed attempts for {user_id} within {} minutes",
                                    window.len(),
                                    self.config.failed_attempt_window.num_minutes()
                                ),
                                "business_logic_validator.brute_force",
                            ),
                            context,
                        ),
                    );
                }
            }
        }

        if context.user_id.is_some() && context.session_id.is_none() {
            violations.push(annotate(
                SecurityViolation::new(
                    ThreatType::SessionHijacking,
                    AuditSeverity::Medium,
                    "authenticated request carries no session id",
                    "business_logic_validator.session_check",
                ),
                context,
            ));
        }

        if let Some(timestamp) = context.timestamp {
            let skew = (Utc::now() - timestamp).abs();
            if skew > self.config.replay_window {
                violations.push(annotate(
                    SecurityViolation::new(
                        ThreatType::ReplayAttack,
                        AuditSeverity::Medium,
                        format!(
                            "request timestamp is {} seconds off from server time",
                            skew.num_seconds()
                        ),
                        "business_logic_validator.replay_window",
                    ),
                    context,
                ));
            }
        }

        violations
    }

    /// Drops entries outside every tracked window. Intended to be called
    /// periodically by a caller that wants to bound memory use under low
    /// traffic rather than relying on eviction-on-access alone.
    pub fn prune_stale(&self) {
        let now = Utc::now();
        let mut requests = self.requests_by_ip.lock();
        requests.retain(|_, window| {
            prune(window, now, Duration::minutes(1));
            !window.is_empty()
        });
        let mut failures = self.failures_by_user.lock();
        failures.retain(|_, window| {
            prune(window, now, self.config.failed_attempt_window);
            !window.is_empty()
        });
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, span: Duration) {
    while let Some(front) = window.front() {
        if now - *front > span {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn annotate(violation: SecurityViolation, context: &ValidationContext) -> SecurityViolation {
    let mut violation = violation;
    violation.user_id = context.user_id.clone();
    violation.session_id = context.session_id.clone();
    violation.source_ip = context.ip_address.clone();
    violation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_trips_after_cap() {
        let validator = BusinessLogicValidator::new(BusinessLogicConfig {
            rate_limit_per_minute: 2,
            ..Default::default()
        });
        let ctx = ValidationContext::new().with_ip("10.0.0.1");
        validator.validate(&ctx);
        validator.validate(&ctx);
        let violations = validator.validate(&ctx);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::DenialOfService));
    }

    #[test]
    fn brute_force_trips_after_repeated_failures() {
        let validator = BusinessLogicValidator::new(BusinessLogicConfig {
            failed_attempt_limit: 3,
            ..Default::default()
        });
        for _ in 0..3 {
            validator.record_failed_attempt("alice");
        }
        let ctx = ValidationContext::new().with_user("alice").with_session("s1");
        let violations = validator.validate(&ctx);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::BruteForceAttack));
    }

    #[test]
    fn missing_session_id_flags_hijacking() {
        let validator = BusinessLogicValidator::new(BusinessLogicConfig::default());
        let ctx = ValidationContext::new().with_user("alice");
        let violations = validator.validate(&ctx);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::SessionHijacking));
    }

    #[test]
    fn stale_timestamp_flags_replay() {
        let validator = BusinessLogicValidator::new(BusinessLogicConfig::default());
        let ctx = ValidationContext::new().with_timestamp(Utc::now() - Duration::seconds(600));
        let violations = validator.validate(&ctx);
        assert!(violations.iter().any(|v| v.threat_type == ThreatType::ReplayAttack));
    }

    #[test]
    fn fresh_request_has_no_violations() {
        let validator = BusinessLogicValidator::new(BusinessLogicConfig::default());
        let ctx = ValidationContext::new()
            .with_user("alice")
            .with_session("s1")
            .with_ip("10.0.0.1");
        assert!(validator.validate(&ctx).is_empty());
    }
}
