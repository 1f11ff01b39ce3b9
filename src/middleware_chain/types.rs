//! The unit of work a stage processes (`RequestContext`) and the unit of
//! decision it returns (`SecurityMiddlewareResult`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::SecurityContext;

/// What a stage decided to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareAction {
    Allow,
    Deny,
    Block,
    Quarantine,
    LogOnly,
    RateLimit,
}

impl MiddlewareAction {
    /// Stops the chain immediately; no later stage runs.
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Deny | Self::Block)
    }

    /// Logged but does not stop the chain.
    pub fn is_restricted(self) -> bool {
        matches!(self, Self::Quarantine | Self::RateLimit)
    }
}

/// The rationale category behind a `MiddlewareAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareDecision {
    Approved,
    Rejected,
    RequiresReview,
    ConditionalApproval,
}

/// What a single stage's `process` call returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityMiddlewareResult {
    pub action: MiddlewareAction,
    pub decision: MiddlewareDecision,
    pub message: String,
    pub details: HashMap<String, String>,
    pub processed_by: Vec<String>,
}

impl SecurityMiddlewareResult {
    fn new(
        stage: &str,
        action: MiddlewareAction,
        decision: MiddlewareDecision,
        message: impl Into<String>,
    ) -> Self {
        Self {
            action,
            decision,
            message: message.into(),
            details: HashMap::new(),
            processed_by: vec![stage.to_string()],
        }
    }

    pub fn allow(stage: &str, message: impl Into<String>) -> Self {
        Self::new(stage, MiddlewareAction::Allow, MiddlewareDecision::Approved, message)
    }

    pub fn deny(stage: &str, message: impl Into<String>) -> Self {
        Self::new(stage, MiddlewareAction::Deny, MiddlewareDecision::Rejected, message)
    }

    pub fn block(stage: &str, message: impl Into<String>) -> Self {
        Self::new(stage, MiddlewareAction::Block, MiddlewareDecision::Rejected, message)
    }

    pub fn quarantine(stage: &str, message: impl Into<String>) -> Self {
        Self::new(
            stage,
            MiddlewareAction::Quarantine,
            MiddlewareDecision::RequiresReview,
            message,
        )
    }

    pub fn log_only(stage: &str, message: impl Into<String>) -> Self {
        Self::new(
            stage,
            MiddlewareAction::LogOnly,
            MiddlewareDecision::ConditionalApproval,
            message,
        )
    }

    pub fn rate_limit(stage: &str, message: impl Into<String>) -> Self {
        Self::new(
            stage,
            MiddlewareAction::RateLimit,
            MiddlewareDecision::ConditionalApproval,
            message,
        )
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// One request as it travels through the chain. Stages read and annotate it
/// in place; `security_context` is populated by the authentication stage for
/// every stage after it to rely on.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub adapter_id: Option<String>,

    pub resource: String,
    pub action: String,
    pub payload: serde_json::Value,

    pub security_context: Option<SecurityContext>,
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            session_id: None,
            ip_address: None,
            user_agent: None,
            adapter_id: None,
            resource: resource.into(),
            action: action.into(),
            payload: serde_json::Value::Null,
            security_context: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = Some(adapter_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let mut map = match self.payload {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        map.insert("code".to_string(), serde_json::Value::String(code.into()));
        self.payload = serde_json::Value::Object(map);
        self
    }

    /// The `code` string carried by the payload, if any.
    pub fn code(&self) -> Option<&str> {
        self.payload.get("code").and_then(|v| v.as_str())
    }
}
