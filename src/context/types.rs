//! Core data types owned by the Context Manager: `SecurityContext` and `Session`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidentiality tier a context was established under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    Public,
    Internal,
    Confidential,
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self::Public
    }
}

/// The authenticated state of a subject for the duration of a session.
///
/// Created by the Context Manager on authentication, mutated only by it (refresh),
/// destroyed by it on logout or expiry. See `SPEC_FULL.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: String,
    pub session_id: Uuid,
    pub permissions: HashSet<String>,
    pub security_level: SecurityLevel,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SecurityContext {
    /// `expires_at` absent or strictly greater than `created_at` is the struct's
    /// invariant; callers that build a context outside [`ContextManager`] (tests,
    /// fixtures) should route through this constructor to uphold it.
    pub fn new(user_id: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Uuid::new_v4(),
            permissions: HashSet::new(),
            security_level: SecurityLevel::default(),
            ip_address: ip_address.into(),
            user_agent: None,
            created_at: Utc::now(),
            expires_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: HashSet<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = level;
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.expires_at = Some(self.created_at + timeout);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A context is valid iff it is not expired.
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expiry) => Utc::now() >= expiry,
            None => false,
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Suspended,
    Terminated,
}

/// A bounded-lifetime binding of a subject to a [`SecurityContext`], with access
/// bookkeeping layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub context: SecurityContext,
    pub status: SessionStatus,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub client_info: HashMap<String, String>,
    pub security_flags: HashSet<String>,
}

impl Session {
    pub fn new(context: SecurityContext) -> Self {
        let now = context.created_at;
        Self {
            context,
            status: SessionStatus::Active,
            last_accessed: now,
            access_count: 0,
            client_info: HashMap::new(),
            security_flags: HashSet::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active && self.context.is_valid()
    }

    pub fn session_id(&self) -> Uuid {
        self.context.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.context.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_without_timeout_never_expires() {
        let ctx = SecurityContext::new("alice", "127.0.0.1");
        assert!(ctx.is_valid());
        assert!(!ctx.is_expired());
    }

    #[test]
    fn context_with_past_timeout_is_expired() {
        let ctx = SecurityContext::new("alice", "127.0.0.1").with_timeout(Duration::seconds(-1));
        assert!(ctx.is_expired());
        assert!(!ctx.is_valid());
    }

    #[test]
    fn session_touch_increments_access_count() {
        let ctx = SecurityContext::new("bob", "10.0.0.1");
        let mut session = Session::new(ctx);
        assert_eq!(session.access_count, 0);
        session.touch();
        assert_eq!(session.access_count, 1);
    }
}
