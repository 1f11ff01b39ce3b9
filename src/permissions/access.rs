//! Request/response types for a single permission check.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A request to perform `action` on `resource` as `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub user_id: String,
    pub resource: String,
    pub action: String,
    pub context: HashMap<String, String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AccessRequest {
    pub fn new(
        user_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource: resource.into(),
            action: action.into(),
            context: HashMap::new(),
            session_id: None,
            ip_address: None,
            user_agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
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

    pub(crate) fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.resource, self.action)
    }
}

/// The final verdict of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Deny,
    /// A stage had no opinion; evaluation falls through to the next stage. A
    /// top-level result of `Abstain` is never returned from `check_permission` —
    /// it is converted to `Deny` at the default-deny fallthrough.
    Abstain,
    /// Access is permitted only if the caller separately satisfies the
    /// conditions named in `AccessResult::conditions_evaluated` (e.g. a
    /// step-up authentication prompt) — distinct from `Allow`, which grants
    /// outright.
    Conditional,
}

/// The outcome of a permission check, with enough detail to audit the decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResult {
    pub decision: AccessDecision,
    pub reason: String,
    pub permissions_used: Vec<String>,
    pub conditions_evaluated: Vec<String>,
    pub evaluation_time_ms: f64,
    pub metadata: HashMap<String, String>,
}

impl AccessResult {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: AccessDecision::Allow,
            reason: reason.into(),
            permissions_used: Vec::new(),
            conditions_evaluated: Vec::new(),
            evaluation_time_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: AccessDecision::Deny,
            reason: reason.into(),
            permissions_used: Vec::new(),
            conditions_evaluated: Vec::new(),
            evaluation_time_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn abstain(reason: impl Into<String>) -> Self {
        Self {
            decision: AccessDecision::Abstain,
            reason: reason.into(),
            permissions_used: Vec::new(),
            conditions_evaluated: Vec::new(),
            evaluation_time_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn conditional(reason: impl Into<String>) -> Self {
        Self {
            decision: AccessDecision::Conditional,
            reason: reason.into(),
            permissions_used: Vec::new(),
            conditions_evaluated: Vec::new(),
            evaluation_time_ms: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_permissions_used(mut self, permissions: Vec<String>) -> Self {
        self.permissions_used = permissions;
        self
    }

    pub fn with_conditions_evaluated(mut self, conditions: Vec<String>) -> Self {
        self.conditions_evaluated = conditions;
        self
    }

    pub fn granted(&self) -> bool {
        self.decision == AccessDecision::Allow
    }
}
