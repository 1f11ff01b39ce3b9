//! Behavioral analysis: bounded per-user and per-IP action rings checked for
//! frequency, time-of-day, and volumetric anomalies.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::Mutex;

use crate::audit::AuditSeverity;
use crate::validation::ThreatType;

use super::event::{ThreatAnalysisResult, ThreatEvent};

const SOURCE: &str = "behavior_analyzer";

/// Tunables for the behavioral thresholds.
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    pub ring_capacity: usize,
    pub min_samples: usize,
    pub high_frequency_window: Duration,
    pub high_frequency_threshold: usize,
    pub night_hour_ceiling: u32,
    pub night_activity_threshold: usize,
    pub ip_window: Duration,
    pub ip_request_threshold: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            min_samples: 10,
            high_frequency_window: Duration::minutes(5),
            high_frequency_threshold: 50,
            night_hour_ceiling: 5,
            night_activity_threshold: 10,
            ip_window: Duration::minutes(1),
            ip_request_threshold: 100,
        }
    }
}

struct ActionRecord {
    timestamp: DateTime<Utc>,
}

/// Tracks per-user and per-IP action history in bounded rings and flags
/// frequency/time-of-day/volumetric anomalies.
pub struct BehaviorAnalyzer {
    config: BehaviorConfig,
    user_actions: Mutex<HashMap<String, VecDeque<ActionRecord>>>,
    ip_actions: Mutex<HashMap<String, VecDeque<ActionRecord>>>,
}

impl BehaviorAnalyzer {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            config,
            user_actions: Mutex::new(HashMap::new()),
            ip_actions: Mutex::new(HashMap::new()),
        }
    }

    /// Records one action for `user_id` (and, if present, `ip_address`) and
    /// returns any anomalies it surfaces.
    pub fn record_action(&self, user_id: &str, ip_address: Option<&str>) -> ThreatAnalysisResult {
        let mut result = ThreatAnalysisResult::new();
        let now = Utc::now();

        {
            let mut users = self.user_actions.lock();
            let ring = users.entry(user_id.to_string()).or_default();
            ring.push_back(ActionRecord { timestamp: now });
            while ring.len() > self.config.ring_capacity {
                ring.pop_front();
            }
            for event in self.detect_user_anomalies(user_id, ring, now) {
                result.add_threat(event);
            }
        }

        if let Some(ip) = ip_address {
            let mut ips = self.ip_actions.lock();
            let ring = ips.entry(ip.to_string()).or_default();
            ring.push_back(ActionRecord { timestamp: now });
            while ring.len() > self.config.ring_capacity {
                ring.pop_front();
            }
            for event in self.detect_ip_anomalies(ip, ring, now) {
                result.add_threat(event);
            }
        }

        result
    }

    fn detect_user_anomalies(
        &self,
        user_id: &str,
        ring: &VecDeque<ActionRecord>,
        now: DateTime<Utc>,
    ) -> Vec<ThreatEvent> {
        let mut events = Vec::new();
        if ring.len() < self.config.min_samples {
            return events;
        }

        let recent: Vec<&ActionRecord> = ring
            .iter()
            .filter(|record| now - record.timestamp < self.config.high_frequency_window)
            .collect();

        if recent.len() > self.config.high_frequency_threshold {
            events.push(
                ThreatEvent::new(
                    ThreatType::SuspiciousBehavior,
                    AuditSeverity::Medium,
                    "High Activity Frequency",
                    format!(
                        "user {user_id} performed {} actions in {} minutes",
                        recent.len(),
                        self.config.high_frequency_window.num_minutes()
                    ),
                    SOURCE,
                    "frequency_analysis",
                )
                .with_confidence(0.7)
                .with_user(user_id)
                .with_evidence("action_count", recent.len().to_string()),
            );
        }

        let night_actions = recent
            .iter()
            .filter(|record| record.timestamp.hour() <= self.config.night_hour_ceiling)
            .count();
        if night_actions > self.config.night_activity_threshold {
            events.push(
                ThreatEvent::new(
                    ThreatType::SuspiciousBehavior,
                    AuditSeverity::Low,
                    "Unusual Time Activity",
                    format!("user {user_id} has unusual night-time activity"),
                    SOURCE,
                    "time_pattern_analysis",
                )
                .with_confidence(0.5)
                .with_user(user_id)
                .with_evidence("night_actions", night_actions.to_string()),
            );
        }

        events
    }

    fn detect_ip_anomalies(
        &self,
        ip_address: &str,
        ring: &VecDeque<ActionRecord>,
        now: DateTime<Utc>,
    ) -> Vec<ThreatEvent> {
        let recent = ring
            .iter()
            .filter(|record| now - record.timestamp < self.config.ip_window)
            .count();
        if recent > self.config.ip_request_threshold {
            vec![ThreatEvent::new(
                ThreatType::DenialOfService,
                AuditSeverity::High,
                "Potential DoS Attack",
                format!(
                    "ip {ip_address} made {recent} requests in {} seconds",
                    self.config.ip_window.num_seconds()
                ),
                SOURCE,
                "ip_frequency_analysis",
            )
            .with_confidence(0.9)
            .with_ip(ip_address)
            .with_evidence("request_count", recent.to_string())]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_frequency_is_flagged_after_threshold() {
        let analyzer = BehaviorAnalyzer::new(BehaviorConfig {
            min_samples: 1,
            high_frequency_threshold: 3,
            ..Default::default()
        });
        let mut last = ThreatAnalysisResult::new();
        for _ in 0..5 {
            last = analyzer.record_action("alice", None);
        }
        assert!(last.threat_events.iter().any(|e| e.detection_method == "frequency_analysis"));
    }

    #[test]
    fn ip_dos_is_flagged_after_threshold() {
        let analyzer = BehaviorAnalyzer::new(BehaviorConfig {
            ip_request_threshold: 2,
            ..Default::default()
        });
        let mut last = ThreatAnalysisResult::new();
        for _ in 0..4 {
            last = analyzer.record_action("bob", Some("10.0.0.9"));
        }
        assert!(last.threat_events.iter().any(|e| e.threat_type == ThreatType::DenialOfService));
    }

    #[test]
    fn sparse_activity_has_no_findings() {
        let analyzer = BehaviorAnalyzer::new(BehaviorConfig::default());
        let result = analyzer.record_action("carol", Some("10.0.0.1"));
        assert!(!result.is_threat);
    }
}
