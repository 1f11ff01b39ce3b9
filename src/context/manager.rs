//! The Context Manager (C1): owns the session table and subject identity lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::audit::{AuditEventType, AuditLevel, AuditLogger, AuditSeverity};

use super::error::{ContextError, ContextResult};
use super::types::{SecurityContext, SecurityLevel, Session};
use super::validators::{ValidationResult, ValidatorChain};

/// Tunables for the Context Manager.
#[derive(Debug, Clone)]
pub struct ContextManagerConfig {
    /// Default context lifetime when the caller does not specify one.
    pub default_timeout: Duration,
    /// Maximum concurrent sessions per user before the oldest-accessed is evicted.
    pub max_sessions_per_user: usize,
    /// How often the background sweep removes expired contexts.
    pub cleanup_interval: StdDuration,
}

impl Default for ContextManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::hours(1),
            max_sessions_per_user: 10,
            cleanup_interval: StdDuration::from_secs(60),
        }
    }
}

struct Table {
    sessions: HashMap<Uuid, Session>,
    by_user: HashMap<String, HashSet<Uuid>>,
    suspended_users: HashSet<String>,
}

impl Table {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_user: HashMap::new(),
            suspended_users: HashSet::new(),
        }
    }
}

/// A callback invoked outside the table lock when a context-lifecycle event occurs.
/// Returning `Err` only causes the error to be logged; it never aborts the operation
/// that triggered the callback.
pub type ContextCallback = Arc<dyn Fn(&SecurityContext) -> Result<(), String> + Send + Sync>;

/// Owns the session table. All mutating operations acquire a single async-aware lock;
/// the lock is never held across an `.await` of callback code.
pub struct ContextManager {
    config: ContextManagerConfig,
    table: Mutex<Table>,
    validators: ValidatorChain,
    audit: Option<Arc<AuditLogger>>,
    on_created: RwLock<Vec<ContextCallback>>,
    on_expired: RwLock<Vec<ContextCallback>>,
    shutdown: Arc<Notify>,
    cleanup_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ContextManager {
    pub fn new(config: ContextManagerConfig, audit: Option<Arc<AuditLogger>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            table: Mutex::new(Table::new()),
            validators: ValidatorChain::default_chain(),
            audit,
            on_created: RwLock::new(Vec::new()),
            on_expired: RwLock::new(Vec::new()),
            shutdown: Arc::new(Notify::new()),
            cleanup_task: Mutex::new(None),
        })
    }

    /// Register a callback invoked (outside the lock) whenever a context is created.
    pub fn on_created(&self, callback: ContextCallback) {
        self.on_created.write().push(callback);
    }

    /// Register a callback invoked (outside the lock) whenever a context expires,
    /// whether discovered by [`Self::get_context`] on read or by the background sweep.
    pub fn on_expired(&self, callback: ContextCallback) {
        self.on_expired.write().push(callback);
    }

    fn run_created_callbacks(&self, context: &SecurityContext) {
        for callback in self.on_created.read().iter() {
            if let Err(err) = callback(context) {
                tracing::warn!(error = %err, "context-created callback failed");
            }
        }
    }

    fn run_expired_callbacks(&self, context: &SecurityContext) {
        for callback in self.on_expired.read().iter() {
            if let Err(err) = callback(context) {
                tracing::warn!(error = %err, "context-expired callback failed");
            }
        }
    }

    /// Start the background sweep that evicts expired contexts.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.config.cleanup_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    _ = ticker.tick() => {
                        this.cleanup_expired_contexts().await;
                    }
                }
            }
        });
        let cleanup_task = Arc::clone(self);
        tokio::spawn(async move {
            *cleanup_task.cleanup_task.lock().await = Some(handle);
        });
    }

    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.cleanup_task.lock().await.take() {
            let _ = tokio::time::timeout(StdDuration::from_secs(5), handle).await;
        }
    }

    async fn audit_log(
        &self,
        event_type: AuditEventType,
        message: String,
        level: AuditLevel,
        severity: AuditSeverity,
        user_id: Option<String>,
        session_id: Option<String>,
    ) {
        if let Some(audit) = &self.audit {
            let mut event =
                crate::audit::AuditEvent::new(event_type, message, level, severity)
                    .with_component("context_manager");
            if let Some(user_id) = user_id {
                event = event.with_user(user_id);
            }
            if let Some(session_id) = session_id {
                event = event.with_session(session_id);
            }
            let _ = audit.log_event(event).await;
        }
    }

    /// Create and register a new `SecurityContext`, enforcing validators and the
    /// per-user session cap.
    pub async fn create_context(
        &self,
        user_id: impl Into<String>,
        permissions: HashSet<String>,
        security_level: SecurityLevel,
        ip_address: impl Into<String>,
        user_agent: Option<String>,
        timeout: Option<Duration>,
        metadata: HashMap<String, String>,
    ) -> ContextResult<SecurityContext> {
        let user_id = user_id.into();
        {
            let table = self.table.lock().await;
            if table.suspended_users.contains(&user_id) {
                return Err(ContextError::UserSuspended(user_id));
            }
        }

        let mut context = SecurityContext::new(user_id.clone(), ip_address)
            .with_permissions(permissions)
            .with_security_level(security_level)
            .with_timeout(timeout.unwrap_or(self.config.default_timeout));
        if let Some(ua) = user_agent {
            context = context.with_user_agent(ua);
        }
        for (k, v) in metadata {
            context = context.with_metadata(k, v);
        }

        let validation = self.validators.validate(&context);
        if !validation.is_valid() {
            self.audit_log(
                AuditEventType::AuthFailed,
                format!("context validation failed for {user_id}: {:?}", validation.errors),
                AuditLevel::Warning,
                AuditSeverity::Medium,
                Some(user_id.clone()),
                None,
            )
            .await;
            return Err(ContextError::Validation(validation.errors.join("; ")));
        }
        self.log_validation_warnings(&user_id, &validation).await;

        let evicted = self.insert_and_enforce_cap(context.clone()).await;
        for session_id in evicted {
            self.audit_log(
                AuditEventType::SessionEvicted,
                format!("session {session_id} evicted: per-user session cap exceeded"),
                AuditLevel::Info,
                AuditSeverity::Low,
                Some(user_id.clone()),
                Some(session_id.to_string()),
            )
            .await;
        }

        self.run_created_callbacks(&context);

        self.audit_log(
            AuditEventType::AuthLogin,
            format!("context created for {user_id}"),
            AuditLevel::Info,
            AuditSeverity::Low,
            Some(user_id),
            Some(context.session_id.to_string()),
        )
        .await;

        Ok(context)
    }

    async fn log_validation_warnings(&self, user_id: &str, validation: &ValidationResult) {
        if validation.warnings.is_empty() {
            return;
        }
        self.audit_log(
            AuditEventType::AuthLogin,
            format!("context created for {user_id} with warnings: {:?}", validation.warnings),
            AuditLevel::Warning,
            AuditSeverity::Low,
            Some(user_id.to_string()),
            None,
        )
        .await;
    }

    async fn insert_and_enforce_cap(&self, context: SecurityContext) -> Vec<Uuid> {
        let mut table = self.table.lock().await;
        let user_id = context.user_id.clone();
        let session_id = context.session_id;
        table.sessions.insert(session_id, Session::new(context));
        table.by_user.entry(user_id.clone()).or_default().insert(session_id);

        let mut evicted = Vec::new();
        let max = self.config.max_sessions_per_user;
        loop {
            let ids: Vec<Uuid> = table
                .by_user
                .get(&user_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            if ids.len() <= max {
                break;
            }
            let oldest = ids
                .into_iter()
                .filter_map(|id| table.sessions.get(&id).map(|s| (id, s.last_accessed)))
                .min_by_key(|(_, last_accessed)| *last_accessed)
                .map(|(id, _)| id);
            let Some(oldest) = oldest else { break };
            table.sessions.remove(&oldest);
            if let Some(set) = table.by_user.get_mut(&user_id) {
                set.remove(&oldest);
            }
            evicted.push(oldest);
        }
        evicted
    }

    /// Look up a context by session id. Returns `None` and evicts the entry if expired.
    pub async fn get_context(&self, session_id: Uuid) -> Option<SecurityContext> {
        let expired_context = {
            let mut table = self.table.lock().await;
            let expired = table
                .sessions
                .get(&session_id)
                .map(|s| s.context.is_expired())
                .unwrap_or(false);
            if !expired {
                let session = table.sessions.get_mut(&session_id)?;
                session.touch();
                return Some(session.context.clone());
            }
            let session = table.sessions.remove(&session_id)?;
            if let Some(set) = table.by_user.get_mut(&session.context.user_id) {
                set.remove(&session_id);
            }
            session.context
        };
        self.run_expired_callbacks(&expired_context);
        None
    }

    pub async fn validate_context(&self, context: &SecurityContext) -> ValidationResult {
        self.validators.validate(context)
    }

    /// Extend `expires_at` by `extend` (or the configured default timeout).
    pub async fn refresh_context(
        &self,
        session_id: Uuid,
        extend: Option<Duration>,
    ) -> ContextResult<SecurityContext> {
        let mut table = self.table.lock().await;
        let session = table
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| ContextError::SessionNotFound(session_id.to_string()))?;
        let extension = extend.unwrap_or(self.config.default_timeout);
        session.context.expires_at = Some(Utc::now() + extension);
        session.touch();
        Ok(session.context.clone())
    }

    pub async fn remove_context(&self, session_id: Uuid) {
        let mut table = self.table.lock().await;
        if let Some(session) = table.sessions.remove(&session_id) {
            if let Some(set) = table.by_user.get_mut(&session.context.user_id) {
                set.remove(&session_id);
            }
        }
    }

    pub async fn get_user_sessions(&self, user_id: &str) -> Vec<SecurityContext> {
        let table = self.table.lock().await;
        table
            .by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| table.sessions.get(id))
                    .map(|s| s.context.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Terminate all of a user's sessions, optionally sparing `exclude`.
    pub async fn terminate_user_sessions(&self, user_id: &str, exclude: Option<Uuid>) -> usize {
        let mut table = self.table.lock().await;
        let Some(ids) = table.by_user.get(user_id).cloned() else {
            return 0;
        };
        let mut removed = 0;
        for id in ids {
            if Some(id) == exclude {
                continue;
            }
            table.sessions.remove(&id);
            if let Some(set) = table.by_user.get_mut(user_id) {
                set.remove(&id);
            }
            removed += 1;
        }
        removed
    }

    /// Immediately terminate all of a user's sessions and bar new context creation
    /// until [`Self::unsuspend_user`] is called. See DESIGN.md's resolution of the
    /// `suspend_user` open question.
    pub async fn suspend_user(&self, user_id: &str, reason: &str) {
        {
            let mut table = self.table.lock().await;
            table.suspended_users.insert(user_id.to_string());
        }
        self.terminate_user_sessions(user_id, None).await;
        self.audit_log(
            AuditEventType::SecurityViolation,
            format!("user {user_id} suspended: {reason}"),
            AuditLevel::Critical,
            AuditSeverity::Critical,
            Some(user_id.to_string()),
            None,
        )
        .await;
    }

    pub async fn unsuspend_user(&self, user_id: &str) {
        self.table.lock().await.suspended_users.remove(user_id);
    }

    pub async fn is_suspended(&self, user_id: &str) -> bool {
        self.table.lock().await.suspended_users.contains(user_id)
    }

    /// Sweep the table for expired contexts, returning how many were removed.
    pub async fn cleanup_expired_contexts(&self) -> usize {
        let expired_contexts = {
            let mut table = self.table.lock().await;
            let expired_ids: Vec<Uuid> = table
                .sessions
                .iter()
                .filter(|(_, s)| s.context.is_expired())
                .map(|(id, _)| *id)
                .collect();
            let mut expired_contexts = Vec::with_capacity(expired_ids.len());
            for id in &expired_ids {
                if let Some(session) = table.sessions.remove(id) {
                    if let Some(set) = table.by_user.get_mut(&session.context.user_id) {
                        set.remove(id);
                    }
                    expired_contexts.push(session.context);
                }
            }
            expired_contexts
        };
        for context in &expired_contexts {
            self.run_expired_callbacks(context);
        }
        expired_contexts.len()
    }

    /// Number of live (non-expired) sessions currently tracked, for diagnostics.
    pub async fn active_session_count(&self) -> usize {
        self.table.lock().await.sessions.len()
    }

    /// Drops every tracked session, regardless of owner. Used by emergency lockdown;
    /// does not suspend any user, so new sessions can be created immediately after.
    pub async fn terminate_all_sessions(&self) -> usize {
        let mut table = self.table.lock().await;
        let removed = table.sessions.len();
        table.sessions.clear();
        table.by_user.clear();
        removed
    }
}

#[allow(dead_code)]
fn _assert_send_sync<T: Send + Sync>() {}
#[allow(dead_code)]
fn _context_manager_is_send_sync() {
    _assert_send_sync::<ContextManager>();
}

/// A point-in-time snapshot used by [`ContextManager::get_user_sessions`] callers that
/// need the raw expiry timestamp rather than the `is_expired()` boolean.
pub fn expires_at_or(context: &SecurityContext, fallback: DateTime<Utc>) -> DateTime<Utc> {
    context.expires_at.unwrap_or(fallback)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn manager() -> Arc<ContextManager> {
        ContextManager::new(ContextManagerConfig::default(), None)
    }

    #[tokio::test]
    async fn create_and_get_context_round_trips() {
        let manager = manager().await;
        let ctx = manager
            .create_context(
                "alice",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                None,
                HashMap::new(),
            )
            .await
            .expect("context created");
        let fetched = manager.get_context(ctx.session_id).await;
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn empty_user_id_fails_validation() {
        let manager = manager().await;
        let result = manager
            .create_context(
                "",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                None,
                HashMap::new(),
            )
            .await;
        assert!(matches!(result, Err(ContextError::Validation(_))));
    }

    #[tokio::test]
    async fn expired_context_is_evicted_on_read() {
        let manager = manager().await;
        let ctx = manager
            .create_context(
                "alice",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                Some(Duration::seconds(-1)),
                HashMap::new(),
            )
            .await
            .expect("context created");
        assert!(manager.get_context(ctx.session_id).await.is_none());
        assert_eq!(manager.active_session_count().await, 0);
    }

    #[tokio::test]
    async fn session_cap_evicts_oldest_accessed() {
        let mut config = ContextManagerConfig::default();
        config.max_sessions_per_user = 2;
        let manager = ContextManager::new(config, None);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let ctx = manager
                .create_context(
                    "alice",
                    HashSet::new(),
                    SecurityLevel::Public,
                    "127.0.0.1",
                    None,
                    None,
                    HashMap::new(),
                )
                .await
                .expect("context created");
            ids.push(ctx.session_id);
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        let sessions = manager.get_user_sessions("alice").await;
        assert_eq!(sessions.len(), 2);
        assert!(!sessions.iter().any(|s| s.session_id == ids[0]));
    }

    #[tokio::test]
    async fn suspended_user_cannot_create_new_context() {
        let manager = manager().await;
        manager.suspend_user("alice", "test").await;
        let result = manager
            .create_context(
                "alice",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                None,
                HashMap::new(),
            )
            .await;
        assert!(matches!(result, Err(ContextError::UserSuspended(_))));
    }

    #[tokio::test]
    async fn refresh_extends_expiry() {
        let manager = manager().await;
        let ctx = manager
            .create_context(
                "alice",
                HashSet::new(),
                SecurityLevel::Public,
                "127.0.0.1",
                None,
                Some(Duration::seconds(1)),
                HashMap::new(),
            )
            .await
            .expect("context created");
        let refreshed = manager
            .refresh_context(ctx.session_id, Some(Duration::hours(1)))
            .await
            .expect("refresh");
        assert!(refreshed.expires_at.unwrap() > ctx.expires_at.unwrap());
    }
}
