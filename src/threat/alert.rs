//! Alert aggregation: bundles related [`ThreatEvent`]s into a queryable,
//! acknowledgeable [`SecurityAlert`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditSeverity;

use super::event::ThreatEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_id: Uuid,
    pub threat_events: Vec<ThreatEvent>,
    pub severity: AuditSeverity,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,

    pub affected_users: HashSet<String>,
    pub affected_adapters: HashSet<String>,
    pub source_ips: HashSet<String>,

    pub acknowledged: bool,
    pub resolved: bool,
}

impl SecurityAlert {
    pub fn new(threat_events: Vec<ThreatEvent>, title: impl Into<String>, description: impl Into<String>) -> Self {
        let severity = threat_events
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or(AuditSeverity::Low);

        let mut affected_users = HashSet::new();
        let mut affected_adapters = HashSet::new();
        let mut source_ips = HashSet::new();
        for event in &threat_events {
            if let Some(user_id) = &event.user_id {
                affected_users.insert(user_id.clone());
            }
            if let Some(adapter_id) = &event.adapter_id {
                affected_adapters.insert(adapter_id.clone());
            }
            if let Some(ip) = &event.ip_address {
                source_ips.insert(ip.clone());
            }
        }

        Self {
            alert_id: Uuid::new_v4(),
            threat_events,
            severity,
            title: title.into(),
            description: description.into(),
            created_at: Utc::now(),
            affected_users,
            affected_adapters,
            source_ips,
            acknowledged: false,
            resolved: false,
        }
    }

    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    pub fn resolve(&mut self) {
        self.resolved = true;
    }

    pub fn names_user(&self, user_id: &str) -> bool {
        self.affected_users.contains(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ThreatType;

    #[test]
    fn severity_is_max_of_constituent_events() {
        let events = vec![
            ThreatEvent::new(ThreatType::MaliciousCode, AuditSeverity::Low, "a", "a", "s", "m"),
            ThreatEvent::new(ThreatType::MaliciousCode, AuditSeverity::Critical, "b", "b", "s", "m"),
        ];
        let alert = SecurityAlert::new(events, "t", "d");
        assert_eq!(alert.severity, AuditSeverity::Critical);
    }

    #[test]
    fn acknowledge_and_resolve_set_flags() {
        let mut alert = SecurityAlert::new(Vec::new(), "t", "d");
        alert.acknowledge();
        alert.resolve();
        assert!(alert.acknowledged);
        assert!(alert.resolved);
    }
}
