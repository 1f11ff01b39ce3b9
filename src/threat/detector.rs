//! `ThreatDetector`: the C4 facade combining static code analysis, behavioral
//! analysis, alert aggregation, and automatic suspension of the identity a
//! HIGH/CRITICAL finding names.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventType, AuditLevel, AuditLogger, AuditSeverity};
use crate::context::ContextManager;

use super::alert::SecurityAlert;
use super::behavior::{BehaviorAnalyzer, BehaviorConfig};
use super::code_analysis;
use super::event::{ThreatAnalysisResult, ThreatEvent};

const MAX_THREAT_HISTORY: usize = 10_000;
const MAX_ALERT_HISTORY: usize = 1_000;

#[derive(Debug, Default, Clone)]
pub struct DetectionStats {
    pub total_scans: u64,
    pub threats_detected: u64,
    pub auto_blocked: u64,
}

#[derive(Default)]
struct AtomicDetectionStats {
    total_scans: AtomicU64,
    threats_detected: AtomicU64,
    auto_blocked: AtomicU64,
}

impl AtomicDetectionStats {
    fn snapshot(&self) -> DetectionStats {
        DetectionStats {
            total_scans: self.total_scans.load(Ordering::Relaxed),
            threats_detected: self.threats_detected.load(Ordering::Relaxed),
            auto_blocked: self.auto_blocked.load(Ordering::Relaxed),
        }
    }
}

/// Analyzes code and behavior for threats, raises alerts, and — when wired
/// to a [`ContextManager`] — automatically suspends a subject named by a
/// HIGH/CRITICAL finding.
pub struct ThreatDetector {
    behavior: BehaviorAnalyzer,
    recent_threats: Mutex<VecDeque<ThreatEvent>>,
    alerts: Mutex<VecDeque<SecurityAlert>>,
    stats: AtomicDetectionStats,
    context_manager: Option<Arc<ContextManager>>,
    audit: Option<Arc<AuditLogger>>,
}

impl ThreatDetector {
    pub fn new(
        behavior_config: BehaviorConfig,
        context_manager: Option<Arc<ContextManager>>,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            behavior: BehaviorAnalyzer::new(behavior_config),
            recent_threats: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(VecDeque::new()),
            stats: AtomicDetectionStats::default(),
            context_manager,
            audit,
        }
    }

    /// Runs the static scanner over `source` and records/responds to any
    /// findings. `context` supplies the subject attribution attached to each
    /// raised event.
    pub async fn analyze_code(
        &self,
        source: &str,
        user_id: Option<&str>,
        adapter_id: Option<&str>,
        ip_address: Option<&str>,
    ) -> ThreatAnalysisResult {
        self.stats.total_scans.fetch_add(1, Ordering::Relaxed);
        let mut result = ThreatAnalysisResult::new();
        for mut event in code_analysis::analyze_code(source) {
            if let Some(user_id) = user_id {
                event.user_id = Some(user_id.to_string());
            }
            if let Some(adapter_id) = adapter_id {
                event.adapter_id = Some(adapter_id.to_string());
            }
            if let Some(ip) = ip_address {
                event.ip_address = Some(ip.to_string());
            }
            result.add_threat(event);
        }
        if result.is_threat {
            self.stats.threats_detected.fetch_add(1, Ordering::Relaxed);
        }
        self.finish(result).await
    }

    /// Records one behavioral action and responds to any anomalies it surfaces.
    pub async fn analyze_behavior(
        &self,
        user_id: &str,
        ip_address: Option<&str>,
    ) -> ThreatAnalysisResult {
        let result = self.behavior.record_action(user_id, ip_address);
        if result.is_threat {
            self.stats.threats_detected.fetch_add(1, Ordering::Relaxed);
        }
        self.finish(result).await
    }

    async fn finish(&self, result: ThreatAnalysisResult) -> ThreatAnalysisResult {
        {
            let mut history = self.recent_threats.lock();
            for event in &result.threat_events {
                history.push_back(event.clone());
                while history.len() > MAX_THREAT_HISTORY {
                    history.pop_front();
                }
            }
        }

        for event in &result.threat_events {
            self.respond(event).await;
        }

        result
    }

    async fn respond(&self, event: &ThreatEvent) {
        if !event.is_actionable() {
            return;
        }
        self.stats.auto_blocked.fetch_add(1, Ordering::Relaxed);

        if let (Some(user_id), Some(context_manager)) = (&event.user_id, &self.context_manager) {
            context_manager
                .suspend_user(user_id, &format!("automatic suspension: {}", event.title))
                .await;
        }

        let Some(audit) = &self.audit else { return };
        let mut audit_event = AuditEvent::new(
            AuditEventType::EmergencyLockdown,
            format!("{}: {}", event.title, event.description),
            AuditLevel::Critical,
            event.severity,
        )
        .with_component("threat_detector");
        if let Some(user_id) = &event.user_id {
            audit_event = audit_event.with_user(user_id.clone());
        }
        if let Some(ip) = &event.ip_address {
            audit_event = audit_event.with_ip(ip.clone());
        }
        let _ = audit.log_event(audit_event).await;
    }

    /// Bundles `threat_events` into a new alert and returns it.
    pub fn create_alert(
        &self,
        threat_events: Vec<ThreatEvent>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> SecurityAlert {
        let alert = SecurityAlert::new(threat_events, title, description);
        let mut alerts = self.alerts.lock();
        alerts.push_back(alert.clone());
        while alerts.len() > MAX_ALERT_HISTORY {
            alerts.pop_front();
        }
        alert
    }

    pub fn acknowledge_alert(&self, alert_id: Uuid) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.alert_id == alert_id) {
            Some(alert) => {
                alert.acknowledge();
                true
            }
            None => false,
        }
    }

    pub fn resolve_alert(&self, alert_id: Uuid) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.alert_id == alert_id) {
            Some(alert) => {
                alert.resolve();
                true
            }
            None => false,
        }
    }

    pub fn recent_threats(&self, limit: usize) -> Vec<ThreatEvent> {
        let history = self.recent_threats.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn alerts(&self, limit: usize) -> Vec<SecurityAlert> {
        let alerts = self.alerts.lock();
        alerts.iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malicious_code_is_recorded_and_returns_threat() {
        let detector = ThreatDetector::new(BehaviorConfig::default(), None, None);
        let result = detector
            .analyze_code("eval(user_supplied)", Some("alice"), None, None)
            .await;
        assert!(result.is_threat);
        assert!(!detector.recent_threats(10).is_empty());
    }

    #[tokio::test]
    async fn high_severity_finding_auto_suspends_named_user() {
        let context_manager = ContextManager::new(Default::default(), None);
        let detector = ThreatDetector::new(BehaviorConfig::default(), Some(context_manager.clone()), None);
        detector
            .analyze_code("eval(x)", Some("mallory"), None, None)
            .await;
        assert!(context_manager.is_suspended("mallory").await);
    }

    #[tokio::test]
    async fn clean_code_is_not_a_threat() {
        let detector = ThreatDetector::new(BehaviorConfig::default(), None, None);
        let result = detector.analyze_code("fn main() {}", None, None, None).await;
        assert!(!result.is_threat);
    }

    #[test]
    fn alert_lifecycle_tracks_acknowledge_and_resolve() {
        let detector = ThreatDetector::new(BehaviorConfig::default(), None, None);
        let alert = detector.create_alert(Vec::new(), "t", "d");
        assert!(detector.acknowledge_alert(alert.alert_id));
        assert!(detector.resolve_alert(alert.alert_id));
    }
}
