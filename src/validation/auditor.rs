//! Records findings, watches for repeated patterns, and scores per-user risk.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::audit::AuditSeverity;

use super::types::{SecurityViolation, ThreatType};

const MAX_VIOLATION_HISTORY: usize = 10_000;
const MAX_PATTERN_HISTORY: usize = 1_000;
const REPEAT_ALERT_THRESHOLD: usize = 3;
const REPEAT_ALERT_WINDOW_MINUTES: i64 = 5;
const REPEAT_ALERT_MIN_TOTAL: usize = 5;

/// A raised alert: either an immediate high-severity finding, or a repeated
/// (threat, source IP) pattern crossing the threshold.
#[derive(Debug, Clone)]
pub struct SecurityAlert {
    pub reason: String,
    pub threat_type: ThreatType,
    pub severity: AuditSeverity,
    pub source_ip: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

struct PatternKey {
    threat_type: ThreatType,
    source_ip: String,
}

impl PatternKey {
    fn label(&self) -> String {
        format!("{:?}:{}", self.threat_type, self.source_ip)
    }
}

/// Tracks findings over time. All state lives behind `parking_lot::Mutex`es
/// since the hot path (`record`) is synchronous and called from both async
/// and non-async validator call sites.
pub struct SecurityAuditor {
    violations: Mutex<VecDeque<SecurityViolation>>,
    pattern_history: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    user_activity: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl Default for SecurityAuditor {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityAuditor {
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(VecDeque::new()),
            pattern_history: Mutex::new(HashMap::new()),
            user_activity: Mutex::new(HashMap::new()),
        }
    }

    /// Records `violation` and returns any alerts it triggers.
    pub fn record(&self, violation: &SecurityViolation) -> Vec<SecurityAlert> {
        let mut alerts = Vec::new();

        {
            let mut history = self.violations.lock();
            history.push_back(violation.clone());
            while history.len() > MAX_VIOLATION_HISTORY {
                history.pop_front();
            }
        }

        if let Some(user_id) = &violation.user_id {
            let mut activity = self.user_activity.lock();
            let window = activity.entry(user_id.clone()).or_default();
            window.push_back(violation.timestamp);
            while window.len() > MAX_VIOLATION_HISTORY {
                window.pop_front();
            }
        }

        if violation.is_critical() {
            alerts.push(SecurityAlert {
                reason: format!("{:?} at {:?} severity", violation.threat_type, violation.severity),
                threat_type: violation.threat_type,
                severity: violation.severity,
                source_ip: violation.source_ip.clone(),
                user_id: violation.user_id.clone(),
                timestamp: violation.timestamp,
            });
        }

        if let Some(source_ip) = &violation.source_ip {
            let key = PatternKey {
                threat_type: violation.threat_type,
                source_ip: source_ip.clone(),
            }
            .label();
            let mut patterns = self.pattern_history.lock();
            let window = patterns.entry(key).or_default();
            window.push_back(violation.timestamp);
            while window.len() > MAX_PATTERN_HISTORY {
                window.pop_front();
            }
            let recent = window
                .iter()
                .filter(|t| violation.timestamp - **t <= Duration::minutes(REPEAT_ALERT_WINDOW_MINUTES))
                .count();
            if window.len() >= REPEAT_ALERT_MIN_TOTAL && recent >= REPEAT_ALERT_THRESHOLD {
                alerts.push(SecurityAlert {
                    reason: format!(
                        "{recent} occurrences of {:?} from {source_ip} within {REPEAT_ALERT_WINDOW_MINUTES} minutes",
                        violation.threat_type
                    ),
                    threat_type: violation.threat_type,
                    severity: violation.severity,
                    source_ip: Some(source_ip.clone()),
                    user_id: violation.user_id.clone(),
                    timestamp: violation.timestamp,
                });
            }
        }

        alerts
    }

    /// Findings recorded within `window` of now, most recent last.
    pub fn violation_summary(&self, window: Duration) -> Vec<SecurityViolation> {
        let cutoff = Utc::now() - window;
        self.violations
            .lock()
            .iter()
            .filter(|v| v.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// A time-decayed, severity-weighted risk score for `user_id`, in `[0, 1]`.
    ///
    /// Each finding within the last 24 hours counts at full weight; after that
    /// its weight decays 10% per additional day. The sum is capped at `1.0`.
    pub fn user_risk_score(&self, user_id: &str) -> f64 {
        if !self.user_activity.lock().contains_key(user_id) {
            return 0.0;
        }
        let violations = self.violations.lock();
        let now = Utc::now();
        let mut score = 0.0;
        for violation in violations.iter().filter(|v| v.user_id.as_deref() == Some(user_id)) {
            let age_hours = (now - violation.timestamp).num_minutes() as f64 / 60.0;
            let decay = if age_hours <= 24.0 {
                1.0
            } else {
                (1.0 - (age_hours - 24.0) * 0.1 / 24.0).max(0.1)
            };
            score += severity_weight(violation.severity) * decay;
        }
        (score / 10.0).min(1.0)
    }

    pub fn total_recorded(&self) -> usize {
        self.violations.lock().len()
    }
}

fn severity_weight(severity: AuditSeverity) -> f64 {
    match severity {
        AuditSeverity::Low => 0.5,
        AuditSeverity::Medium => 1.5,
        AuditSeverity::High => 3.0,
        AuditSeverity::Critical => 5.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(threat: ThreatType, severity: AuditSeverity, ip: &str, user: &str) -> SecurityViolation {
        SecurityViolation::new(threat, severity, "test", "test")
            .with_source_ip(ip)
            .with_user(user)
    }

    #[test]
    fn critical_finding_raises_immediate_alert() {
        let auditor = SecurityAuditor::new();
        let alerts = auditor.record(&violation(
            ThreatType::SqlInjection,
            AuditSeverity::Critical,
            "10.0.0.1",
            "alice",
        ));
        assert!(!alerts.is_empty());
    }

    #[test]
    fn repeated_pattern_raises_alert_after_threshold() {
        let auditor = SecurityAuditor::new();
        let mut last_alerts = Vec::new();
        for _ in 0..5 {
            last_alerts = auditor.record(&violation(
                ThreatType::SuspiciousBehavior,
                AuditSeverity::Low,
                "10.0.0.2",
                "bob",
            ));
        }
        assert!(last_alerts.iter().any(|a| a.reason.contains("occurrences")));
    }

    #[test]
    fn risk_score_increases_with_severity_and_caps_at_one() {
        let auditor = SecurityAuditor::new();
        for _ in 0..20 {
            auditor.record(&violation(
                ThreatType::PrivilegeEscalation,
                AuditSeverity::Critical,
                "10.0.0.3",
                "carol",
            ));
        }
        assert!(auditor.user_risk_score("carol") <= 1.0);
        assert!(auditor.user_risk_score("carol") > 0.0);
    }

    #[test]
    fn unknown_user_has_zero_risk() {
        let auditor = SecurityAuditor::new();
        assert_eq!(auditor.user_risk_score("nobody"), 0.0);
    }
}
