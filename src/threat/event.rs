//! The unit of finding this component raises: a `ThreatEvent`, plus the
//! aggregate `ThreatAnalysisResult` a single `analyze_*` call returns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditSeverity;
use crate::validation::ThreatType;

/// A single detected threat, carrying enough context to drive alerting and
/// automatic suspension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub event_id: Uuid,
    pub threat_type: ThreatType,
    pub severity: AuditSeverity,
    pub title: String,
    pub description: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,

    pub user_id: Option<String>,
    pub adapter_id: Option<String>,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,

    pub detection_method: String,
    pub confidence_score: f64,
    #[serde(default)]
    pub evidence: HashMap<String, String>,

    pub auto_blocked: bool,
    #[serde(default)]
    pub response_actions: Vec<String>,
}

impl ThreatEvent {
    pub fn new(
        threat_type: ThreatType,
        severity: AuditSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        detection_method: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            threat_type,
            severity,
            title: title.into(),
            description: description.into(),
            source: source.into(),
            timestamp: Utc::now(),
            user_id: None,
            adapter_id: None,
            ip_address: None,
            session_id: None,
            detection_method: detection_method.into(),
            confidence_score: 0.0,
            evidence: HashMap::new(),
            auto_blocked: false,
            response_actions: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence_score: f64) -> Self {
        self.confidence_score = confidence_score.clamp(0.0, 1.0);
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self.severity, AuditSeverity::High | AuditSeverity::Critical)
    }
}

/// The aggregate outcome of one `analyze_code`/`analyze_behavior` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatAnalysisResult {
    pub is_threat: bool,
    pub threat_events: Vec<ThreatEvent>,
    pub risk_score: f64,
    pub recommendations: Vec<String>,
}

impl ThreatAnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_threat(&mut self, event: ThreatEvent) {
        self.is_threat = true;
        let level_score = match event.severity {
            AuditSeverity::Low => 0.25,
            AuditSeverity::Medium => 0.5,
            AuditSeverity::High => 0.75,
            AuditSeverity::Critical => 1.0,
        };
        let event_score = level_score * event.confidence_score;
        self.risk_score = self.risk_score.max(event_score);
        self.threat_events.push(event);
    }

    pub fn merge(&mut self, other: ThreatAnalysisResult) {
        self.is_threat = self.is_threat || other.is_threat;
        self.risk_score = self.risk_score.max(other.risk_score);
        self.threat_events.extend(other.threat_events);
        for rec in other.recommendations {
            if !self.recommendations.contains(&rec) {
                self.recommendations.push(rec);
            }
        }
    }
}
