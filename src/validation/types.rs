//! Shared data model for the Security Validator: the threat taxonomy, violation
//! records, and the per-call verdict.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditSeverity;

/// How aggressively a caller wants payloads scrutinized.
///
/// `Basic` runs only the structural/size checks; each step up adds pattern
/// families until `Paranoid`, which also rejects anything `Suspicious`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Basic,
    Standard,
    Strict,
    Paranoid,
}

impl Default for ValidationLevel {
    fn default() -> Self {
        Self::Standard
    }
}

/// A fixed taxonomy of threat classes a finding can belong to.
///
/// Shared between the Security Validator (C3, pattern-matched findings) and the
/// Threat Detector (C4, behavioral findings) so a single `ThreatType` value means
/// the same thing regardless of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    SqlInjection,
    XssAttack,
    CommandInjection,
    PathTraversal,
    LdapInjection,
    XmlInjection,
    MaliciousCode,
    ResourceExhaustion,
    BruteForceAttack,
    SuspiciousBehavior,
    ResourceAbuse,
    DataExfiltration,
    DataTampering,
    PrivilegeEscalation,
    InjectionAttack,
    DenialOfService,
    UnauthorizedAccess,
    AnomalousPattern,
    SessionHijacking,
    ReplayAttack,
    SensitiveDataExposure,
    ResourceLimitExceeded,
    SystemCallDenied,
    BusinessLogicBypass,
    RaceCondition,
}

impl ThreatType {
    /// A conservative default severity for a bare finding of this type, used when
    /// a specific site doesn't compute its own.
    pub fn default_severity(self) -> AuditSeverity {
        use ThreatType::*;
        match self {
            SqlInjection | CommandInjection | PrivilegeEscalation | DataExfiltration
            | RaceCondition => AuditSeverity::Critical,
            XssAttack | PathTraversal | LdapInjection | XmlInjection | MaliciousCode
            | BruteForceAttack | SessionHijacking | SensitiveDataExposure
            | BusinessLogicBypass | InjectionAttack | UnauthorizedAccess => AuditSeverity::High,
            ResourceExhaustion | DenialOfService | ReplayAttack | DataTampering
            | SystemCallDenied | ResourceLimitExceeded => AuditSeverity::Medium,
            SuspiciousBehavior | ResourceAbuse | AnomalousPattern => AuditSeverity::Low,
        }
    }
}

/// A single detected security problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityViolation {
    pub threat_type: ThreatType,
    pub severity: AuditSeverity,
    pub message: String,
    #[serde(default)]
    pub evidence: HashMap<String, String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub source_ip: Option<String>,
    pub detection_method: String,
    /// Confidence in the finding, in `[0, 1]`.
    pub confidence_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl SecurityViolation {
    pub fn new(
        threat_type: ThreatType,
        severity: AuditSeverity,
        message: impl Into<String>,
        detection_method: impl Into<String>,
    ) -> Self {
        Self {
            threat_type,
            severity,
            message: message.into(),
            evidence: HashMap::new(),
            user_id: None,
            session_id: None,
            source_ip: None,
            detection_method: detection_method.into(),
            confidence_score: 1.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn with_confidence(mut self, confidence_score: f64) -> Self {
        self.confidence_score = confidence_score.clamp(0.0, 1.0);
        self
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.severity, AuditSeverity::High | AuditSeverity::Critical)
    }
}

/// Request metadata a call is validated against — the subject, the channel it
/// arrived on, and enough provenance to drive business-logic checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub content_type: Option<String>,
    pub request_size: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

/// The verdict over a set of findings for a single call: the maximum of the
/// individual findings' severity, collapsed to four buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Suspicious,
    Malicious,
    Invalid,
}

impl Verdict {
    /// Fold a finding's severity into a running verdict, keeping the worse of
    /// the two. `Invalid` (structural error) always wins since a malformed
    /// payload can't be meaningfully scored for maliciousness.
    pub fn fold(self, severity: AuditSeverity) -> Self {
        let from_severity = match severity {
            AuditSeverity::Low => Verdict::Valid,
            AuditSeverity::Medium => Verdict::Suspicious,
            AuditSeverity::High | AuditSeverity::Critical => Verdict::Malicious,
        };
        self.max(from_severity)
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_folds_to_worst_severity() {
        let v = Verdict::Valid.fold(AuditSeverity::Low).fold(AuditSeverity::High);
        assert_eq!(v, Verdict::Malicious);
    }

    #[test]
    fn invalid_outranks_malicious() {
        assert!(Verdict::Invalid > Verdict::Malicious);
    }
}
