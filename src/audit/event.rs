//! Audit event schema: the immutable record written by every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Minimum granularity at which an audit event can be filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Default for AuditLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// Security-relevance ranking independent of `AuditLevel`'s verbosity ranking.
///
/// A `DEBUG`-level event can still be `CRITICAL` severity (e.g. a sampled internal
/// probe that happens to reveal a breach); the two axes are tracked separately so
/// filtering on "how chatty" and "how serious" stay orthogonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for AuditSeverity {
    fn default() -> Self {
        Self::Low
    }
}

/// Closed taxonomy of audit event categories.
///
/// Adding a variant is a compatible change; removing one is not (external consumers
/// of the NDJSON log may already be matching on the string value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AdapterLoad,
    AdapterExecute,
    AdapterError,
    AdapterUnload,
    AuthLogin,
    AuthLogout,
    AuthFailed,
    PermissionDenied,
    PermissionChange,
    SecurityViolation,
    ApiRequest,
    ApiResponse,
    ApiError,
    RateLimitHit,
    SystemStart,
    SystemStop,
    ConfigChange,
    ResourceWarning,
    UserAction,
    DataAccess,
    DataModify,
    ThreatDetected,
    SandboxCreate,
    SandboxExecute,
    SandboxDestroy,
    AccessGranted,
    AccessDenied,
    SystemError,
    EmergencyLockdown,
    SessionEvicted,
}

/// An immutable, append-only audit record.
///
/// Once handed to [`crate::audit::AuditLogger::log_event`], an event is never mutated;
/// only new events are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub level: AuditLevel,
    pub severity: AuditSeverity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,

    // Correlation fields.
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub adapter_id: Option<String>,
    pub ip_address: Option<String>,
    pub component: Option<String>,

    // Performance fields.
    pub duration_ms: Option<f64>,
    pub memory_usage: Option<u64>,

    // Error fields.
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,

    // Linkage fields.
    pub correlation_id: Option<String>,
    pub parent_event_id: Option<Uuid>,

    #[serde(default)]
    pub tags: Vec<String>,
    pub category: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl AuditEvent {
    /// Construct a minimal event; callers chain the `with_*` builders for the rest.
    pub fn new(
        event_type: AuditEventType,
        message: impl Into<String>,
        level: AuditLevel,
        severity: AuditSeverity,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            level,
            severity,
            message: message.into(),
            details: serde_json::Value::Null,
            user_id: None,
            session_id: None,
            adapter_id: None,
            ip_address: None,
            component: None,
            duration_ms: None,
            memory_usage: None,
            error_code: None,
            error_message: None,
            stack_trace: None,
            correlation_id: None,
            parent_event_id: None,
            tags: Vec::new(),
            category: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this event's severity mandates the caller-blocks enqueue policy.
    pub fn requires_durable_enqueue(&self) -> bool {
        self.severity >= AuditSeverity::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_has_fresh_id_and_timestamp() {
        let a = AuditEvent::new(AuditEventType::AuthLogin, "login", AuditLevel::Info, AuditSeverity::Low);
        let b = AuditEvent::new(AuditEventType::AuthLogin, "login", AuditLevel::Info, AuditSeverity::Low);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn high_and_critical_require_durable_enqueue() {
        let e = AuditEvent::new(AuditEventType::SecurityViolation, "x", AuditLevel::Error, AuditSeverity::High);
        assert!(e.requires_durable_enqueue());
        let e = AuditEvent::new(AuditEventType::UserAction, "x", AuditLevel::Info, AuditSeverity::Low);
        assert!(!e.requires_durable_enqueue());
    }

    #[test]
    fn serializes_enums_as_lowercase_strings() {
        let e = AuditEvent::new(AuditEventType::AccessDenied, "denied", AuditLevel::Warning, AuditSeverity::Medium)
            .with_user("alice");
        let json = serde_json::to_value(&e).unwrap_or(serde_json::Value::Null);
        assert_eq!(json["event_type"], "access_denied");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["level"], "WARNING");
        assert_eq!(json["user_id"], "alice");
    }
}
